pub mod fake_dataplane;
pub mod logs;
