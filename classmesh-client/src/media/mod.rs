mod devices;
mod local_media;
mod track;

pub use devices::*;
pub use local_media::*;
pub use track::*;
