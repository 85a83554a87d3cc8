pub mod audio;
pub mod clinical;
pub mod job;
pub mod segment;
pub mod transcript;

pub use audio::*;
pub use clinical::*;
pub use job::*;
pub use segment::*;
pub use transcript::*;
