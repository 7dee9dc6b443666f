mod group;
mod registrant;
mod tournament;

pub use group::*;
pub use registrant::*;
pub use tournament::*;
