// Path helpers shared by the daemon sandbox and clients.

pub mod normalize;

pub use normalize::{common_prefix, lexical_join, lexical_normalize, PathError};
