pub mod depth_sample;
pub mod filtered_frame;
pub mod gradient_field;
pub mod mailbox;
pub mod ring_statistics;
pub mod spatial_smoother;
pub mod stability;
pub mod utils;
