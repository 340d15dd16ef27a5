// On-disk document format and file naming.

pub mod codec;
pub mod name;

pub use codec::{body_start_line, CodecError, Document, DocumentFormat, HeaderLayout};
pub use name::{derive_name, disambiguate, is_variant_of, FALLBACK_NAME};
