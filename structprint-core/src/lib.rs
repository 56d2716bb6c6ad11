pub mod error;
pub mod format;
pub mod image;
pub mod request;
pub mod sections;
pub mod value;
pub mod walker;

pub use error::{Error, Result};
pub use format::{parse, ByteOrder, FormatSpec, ParsedSpec, ScalarCode};
pub use image::*;
pub use request::{parse_count, parse_hex, ExtractionRequest};
pub use sections::*;
pub use value::{Row, Value};
pub use walker::{Bound, Rows, StructWalker};
