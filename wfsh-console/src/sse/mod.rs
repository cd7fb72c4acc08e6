//! Server-Sent Events surface for connected renderers

pub mod broadcaster;

pub use broadcaster::SseBroadcaster;
