#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

/// which set of server profiles is active, the two schemes disagree on server ids and probe
/// lists so it has to be picked per deployment
#[derive(clap::ValueEnum, Clone, Debug, Copy, PartialEq, Eq)]
pub enum ServerTableKind {
    /// hosted scraping service, one attempt list per logical server
    Hosted,
    /// self-hosted scraper instances, one port per logical server
    SelfHosted,
}

#[derive(clap::Parser)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum)]
    pub cargo_env: CargoEnv,

    // port that the app will bind to
    #[clap(long, env, default_value = "5000")]
    pub port: u16,

    // this should be either * for allowing everything, or a comma seperated list of domains like
    // example.com,something.com
    #[clap(long, env, default_value = "*")]
    pub cors_origin: String,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,

    // path every rewritten manifest line points back to
    #[clap(long, env, default_value = "/api/v1/proxy")]
    pub public_base_path: String,

    // hosted scraper, requests go to {scrape_service_url}/api/scrape
    #[clap(long, env, default_value = "https://scrape.lordflix.club")]
    pub scrape_service_url: String,

    #[clap(long, env, value_enum, default_value = "hosted")]
    pub server_table: ServerTableKind,

    // only used with the self-hosted table
    #[clap(long, env, default_value = "127.0.0.1")]
    pub self_hosted_scraper_host: String,

    // server=port pairs like veronica=3001,vienna=3002
    #[clap(long, env, default_value = "veronica=3001,vienna=3002")]
    pub self_hosted_scraper_ports: String,

    // profile used when the caller asks for a server that doesn't exist
    #[clap(long, env, default_value = "veronica")]
    pub default_server: String,

    #[clap(long, env, default_value = "30")]
    pub scrape_timeout_secs: u64,

    #[clap(long, env, default_value = "10")]
    pub probe_timeout_secs: u64,

    #[clap(long, env, default_value = "30")]
    pub proxy_timeout_secs: u64,

    // hard ceiling for a whole request, a full resolution can take a couple minutes if every
    // attempt times out
    #[clap(long, env, default_value = "300")]
    pub request_timeout_secs: u64,

    #[clap(long, env, default_value = "3")]
    pub failover_max_retries: u32,

    #[clap(long, env, default_value = "3000")]
    pub failover_retry_delay_ms: u64,

    #[clap(long, env, default_value = "https://rainsubs.vercel.app")]
    pub subtitle_provider_url: String,

    // our own domain, never counted as an embedder
    #[clap(long, env)]
    pub site_domain: Option<String>,

    #[clap(long, env)]
    pub enable_metrics: bool,
}

impl AppConfig {
    /// parses `self_hosted_scraper_ports`, bad pairs are skipped
    pub fn self_hosted_ports(&self) -> Vec<(String, u16)> {
        self.self_hosted_scraper_ports
            .split(',')
            .filter_map(|pair| {
                let (name, port) = pair.split_once('=')?;
                let port = port.trim().parse::<u16>().ok()?;
                let name = name.trim();
                (!name.is_empty()).then(|| (name.to_string(), port))
            })
            .collect()
    }
}

impl Default for AppConfig {
    // defaults aren't really needed here but it's here as a bad fallback
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 5000,
            cors_origin: "*".to_string(),
            sentry_dsn: None,
            public_base_path: "/api/v1/proxy".to_string(),
            scrape_service_url: "https://scrape.lordflix.club".to_string(),
            server_table: ServerTableKind::Hosted,
            self_hosted_scraper_host: "127.0.0.1".to_string(),
            self_hosted_scraper_ports: "veronica=3001,vienna=3002".to_string(),
            default_server: "veronica".to_string(),
            scrape_timeout_secs: 30,
            probe_timeout_secs: 10,
            proxy_timeout_secs: 30,
            request_timeout_secs: 300,
            failover_max_retries: 3,
            failover_retry_delay_ms: 3000,
            subtitle_provider_url: "https://rainsubs.vercel.app".to_string(),
            site_domain: None,
            enable_metrics: false,
        }
    }
}
