use crate::error::Result;
use crate::global_variables::{GRID_ORIGIN_PX, GRID_SIZE, GRID_SPACING_PX};
use crate::simulation_engine::intersections::IntersectionId;

/// Everything a controller learns about its place in the grid at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSetup {
    pub id: IntersectionId,
    pub coordinates: (i32, i32),
    pub south: Option<IntersectionId>,
    pub east: Option<IntersectionId>,
}

impl NodeSetup {
    /// A node with no downstream neighbours.
    pub fn isolated(id: IntersectionId) -> Self {
        Self {
            id,
            coordinates: (0, 0),
            south: None,
            east: None,
        }
    }

    /// Parses `[x, y, neighbour names...]` for the node called `name`.
    ///
    /// Only the node name itself must be well formed. With fewer than two
    /// arguments the node gets (0,0) and no neighbours; bad coordinates fall
    /// back to (0,0); unparsable neighbour names are skipped. Neighbours that
    /// are neither directly south nor directly east are ignored.
    pub fn from_args<S: AsRef<str>>(name: &str, args: &[S]) -> Result<Self> {
        let id: IntersectionId = name.parse()?;
        let mut setup = Self::isolated(id);
        if args.len() < 2 {
            log::warn!("{}: missing setup arguments, using defaults", name);
            return Ok(setup);
        }

        match (args[0].as_ref().parse::<i32>(), args[1].as_ref().parse::<i32>()) {
            (Ok(x), Ok(y)) => setup.coordinates = (x, y),
            _ => log::warn!("{}: malformed coordinates, using (0,0)", name),
        }

        for neighbour in &args[2..] {
            match neighbour.as_ref().parse::<IntersectionId>() {
                Ok(n) if Some(n) == id.south() => setup.south = Some(n),
                Ok(n) if Some(n) == id.east() => setup.east = Some(n),
                Ok(_) => {}
                Err(e) => log::warn!("{}: ignoring neighbour: {}", name, e),
            }
        }
        Ok(setup)
    }
}

/// Setup arguments for a `size`×`size` grid: display coordinates followed by
/// every orthogonal neighbour.
pub fn grid_arguments(size: i8) -> Vec<(String, Vec<String>)> {
    let mut nodes = Vec::new();
    for row in 0..size {
        for col in 0..size {
            let id = IntersectionId(row, col);
            let x = GRID_ORIGIN_PX + GRID_SPACING_PX * col as i32;
            let y = GRID_ORIGIN_PX + GRID_SPACING_PX * row as i32;
            let mut args = vec![x.to_string(), y.to_string()];
            let neighbours = [
                (row - 1, col),
                (row + 1, col),
                (row, col - 1),
                (row, col + 1),
            ];
            for (r, c) in neighbours {
                if (0..size).contains(&r) && (0..size).contains(&c) {
                    args.push(IntersectionId(r, c).to_string());
                }
            }
            nodes.push((id.to_string(), args));
        }
    }
    nodes
}

/// The fixed 3×3 city grid.
pub fn create_grid() -> Result<Vec<NodeSetup>> {
    grid_arguments(GRID_SIZE)
        .iter()
        .map(|(name, args)| NodeSetup::from_args(name, args.as_slice()))
        .collect()
}
