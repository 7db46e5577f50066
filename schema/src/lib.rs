//! Runtime support for the sheetpack binary table format.
//!
//! A sheetpack blob is a flat little-endian byte stream with no padding and no
//! self-description: the reader must already know the field layout (the
//! compiler exports it as a schema descriptor). This crate holds the two
//! pieces every producer and consumer shares:
//!
//! - [`ByteWriter`] / [`ByteReader`] — the canonical wire primitives,
//! - [`TypedValue`] — a dynamic value tree shaped like a resolved field.
//!
//! ```
//! use sheetpack_schema::{ByteWriter, ByteReader};
//!
//! let mut bw = ByteWriter::new();
//! bw.write_string("Alice");
//! bw.write_bool(true);
//! let data = bw.data();
//! assert_eq!(data, [5, 0, 0, 0, b'A', b'l', b'i', b'c', b'e', 1]);
//!
//! let mut br = ByteReader::new(&data);
//! assert_eq!(br.read_string().unwrap(), "Alice");
//! assert_eq!(br.read_bool(), Ok(true));
//! ```

pub mod bb;
pub mod value;

pub use bb::*;
pub use value::*;
