//! Domain atoms for the image gallery: the image record, its codec, the
//! storage seams and the operations on top of them. Nothing in here builds
//! AWS clients; callers hand stores in.

pub mod media;
