// Applications. The frame runs a single one: the periodic image refresh.

pub mod frame;

pub use frame::FrameApp;
