pub mod archive;
pub mod cbor;
pub mod frame;
pub mod record;

pub use archive::{BlockMap, decode_archive};
pub use frame::decode_frame;
pub use record::decode_record;
