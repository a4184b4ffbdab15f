pub mod candidate;
pub mod history;
pub mod message;
pub mod session;
pub mod state;

pub use candidate::*;
pub use history::*;
pub use message::*;
pub use session::*;
pub use state::*;
