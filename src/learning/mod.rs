pub mod q_learning;
pub mod state_encoder;

pub use q_learning::{QLearningPolicy, QTable, RlAction};
pub use state_encoder::{calculate_reward, encode_state, StateId};
