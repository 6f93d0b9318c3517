pub mod checksum;
pub mod digest;
pub mod fixity;

pub use checksum::ContainerChecksumStep;
pub use fixity::FixityStep;
