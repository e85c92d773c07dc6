pub mod health_controller;
pub mod proxy_controller;
pub mod stats_controller;
pub mod stream_controller;
pub mod subtitle_controller;
