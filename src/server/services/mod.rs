pub mod edge_services;
pub mod resolver_services;
pub mod server_profile_services;
pub mod stats_services;
pub mod subtitle_services;
pub mod upstream_services;

pub use resolver_services::DynStreamResolver;
pub use stats_services::DynStatsService;
pub use subtitle_services::DynSubtitleService;
pub use upstream_services::DynUpstreamService;
