use std::time::Duration;

use anyhow::{Context, bail};
use tracing::{info, warn};
use url::Url;

use crate::{
    config::{AppConfig, ServerTableKind},
    models::{ServerId, StreamRequest},
};

/// every logical server used to be its own copy-pasted branch, now they're just rows in a table
/// and the resolver doesn't care which one it's running

/// how a player page url gets handed to the scraper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeParamStyle {
    /// target and selectors percent encoded
    Encoded,
    /// target passed raw, some scrapers choke on an encoded player url
    Raw,
}

#[derive(Debug, Clone)]
pub struct PlayerSite {
    pub name: String,
    pub origin: Url,
    pub style: ScrapeParamStyle,
}

impl PlayerSite {
    pub fn new(name: &str, origin: &str, style: ScrapeParamStyle) -> anyhow::Result<Self> {
        let origin = Url::parse(origin).with_context(|| format!("bad player origin {}", origin))?;
        Ok(Self {
            name: name.to_string(),
            origin,
            style,
        })
    }

    pub fn videasy() -> Self {
        Self::known("videasy", "https://player.videasy.net", ScrapeParamStyle::Encoded)
    }

    pub fn vidlink() -> Self {
        Self::known("vidlink", "https://vidlink.pro", ScrapeParamStyle::Raw)
    }

    fn known(name: &str, origin: &str, style: ScrapeParamStyle) -> Self {
        Self {
            name: name.to_string(),
            origin: Url::parse(origin).expect("notrace - static player origin should parse"),
            style,
        }
    }

    /// `{origin}/{target_path}`
    pub fn page_url(&self, target_path: &str) -> String {
        format!(
            "{}/{}",
            self.origin.as_str().trim_end_matches('/'),
            target_path.trim_start_matches('/')
        )
    }
}

/// one scrape strategy inside a profile, turned into an AttemptSpec per request
#[derive(Debug, Clone)]
pub struct AttemptTemplate {
    pub name: String,
    pub site: PlayerSite,
    /// scrape endpoint, e.g. https://scraper/api/scrape
    pub scraper: String,
    pub click_selector: Option<String>,
    pub wait_for: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptSpec {
    pub name: String,
    pub scrape_request_url: String,
    pub timeout: Duration,
}

impl AttemptTemplate {
    pub fn build(&self, request: &StreamRequest) -> AttemptSpec {
        let target = self.site.page_url(&request.target_path());

        let encode = |value: &str| match self.site.style {
            ScrapeParamStyle::Encoded => urlencoding::encode(value).into_owned(),
            ScrapeParamStyle::Raw => value.to_string(),
        };

        let mut scrape_request_url = format!("{}?url={}", self.scraper, encode(&target));
        if let Some(selector) = &self.click_selector {
            scrape_request_url.push_str(&format!("&clickSelector={}", encode(selector)));
        }
        if let Some(wait_for) = &self.wait_for {
            scrape_request_url.push_str(&format!("&waitFor={}", encode(wait_for)));
        }

        AttemptSpec {
            name: self.name.clone(),
            scrape_request_url,
            timeout: self.timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerProfile {
    pub id: ServerId,
    pub player_origin: Url,
    pub scrape_param_style: ScrapeParamStyle,
    pub attempts: Vec<AttemptTemplate>,
    /// sites guessed at directly once every attempt failed
    pub probe_sites: Vec<PlayerSite>,
}

impl ServerProfile {
    /// the primary site decides the profile's origin and param style
    pub fn new(
        id: &str,
        primary: &PlayerSite,
        attempts: Vec<AttemptTemplate>,
        probe_sites: Vec<PlayerSite>,
    ) -> Self {
        Self {
            id: ServerId::new(id),
            player_origin: primary.origin.clone(),
            scrape_param_style: primary.style,
            attempts,
            probe_sites,
        }
    }

    pub fn attempts_for(&self, request: &StreamRequest) -> Vec<AttemptSpec> {
        self.attempts.iter().map(|a| a.build(request)).collect()
    }

    /// page urls first, then the `/playlist.m3u8` guesses
    pub fn probe_urls(&self, request: &StreamRequest) -> Vec<String> {
        let path = request.target_path();
        let pages = self.probe_sites.iter().map(|site| site.page_url(&path));
        let playlists = self
            .probe_sites
            .iter()
            .map(|site| format!("{}/playlist.m3u8", site.page_url(&path)));

        pages.chain(playlists).collect()
    }
}

#[derive(Debug, Clone)]
pub struct ServerTable {
    pub name: String,
    profiles: Vec<ServerProfile>,
    default_index: usize,
}

impl ServerTable {
    pub fn new(
        name: &str,
        profiles: Vec<ServerProfile>,
        default_server: &str,
    ) -> anyhow::Result<Self> {
        if profiles.is_empty() {
            bail!("server table '{}' has no profiles", name);
        }

        let default_index = match profiles.iter().position(|p| p.id.as_str() == default_server) {
            Some(index) => index,
            None => {
                warn!(
                    "default server '{}' is not in table '{}', using '{}'",
                    default_server, name, profiles[0].id
                );
                0
            }
        };

        Ok(Self {
            name: name.to_string(),
            profiles,
            default_index,
        })
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let scrape_timeout = Duration::from_secs(config.scrape_timeout_secs);

        let table = match config.server_table {
            ServerTableKind::Hosted => {
                let scraper = format!(
                    "{}/api/scrape",
                    config.scrape_service_url.trim_end_matches('/')
                );
                Self::hosted(
                    &scraper,
                    PlayerSite::videasy(),
                    PlayerSite::vidlink(),
                    scrape_timeout,
                    &config.default_server,
                )?
            }
            ServerTableKind::SelfHosted => Self::self_hosted(
                &config.self_hosted_scraper_host,
                &config.self_hosted_ports(),
                PlayerSite::videasy(),
                PlayerSite::vidlink(),
                scrape_timeout,
                &config.default_server,
            )?,
        };

        info!(
            "server table '{}' loaded with {} profiles",
            table.name,
            table.profiles.len()
        );

        Ok(table)
    }

    /// hosted scraper with a fixed set of servers, sites are parameters so tests can point them
    /// at local fixtures
    pub fn hosted(
        scraper: &str,
        videasy: PlayerSite,
        vidlink: PlayerSite,
        timeout: Duration,
        default_server: &str,
    ) -> anyhow::Result<Self> {
        let attempt = |name: &str, site: &PlayerSite, click: Option<&str>, wait: Option<&str>| {
            AttemptTemplate {
                name: name.to_string(),
                site: site.clone(),
                scraper: scraper.to_string(),
                click_selector: click.map(str::to_string),
                wait_for: wait.map(str::to_string),
                timeout,
            }
        };
        let probes = vec![videasy.clone(), vidlink.clone()];

        let profiles = vec![
            ServerProfile::new(
                "veronica",
                &videasy,
                vec![
                    attempt("videasy-main", &videasy, Some(".play-icon-main"), Some(".m3u8")),
                    attempt("videasy-alt", &videasy, None, Some(".m3u8")),
                    attempt("videasy-simple", &videasy, None, None),
                ],
                probes.clone(),
            ),
            ServerProfile::new(
                "vienna",
                &vidlink,
                vec![
                    attempt("vidlink-main", &vidlink, None, Some(".m3u8")),
                    attempt("vidlink-alt", &vidlink, None, None),
                ],
                probes.clone(),
            ),
            ServerProfile::new(
                "backup1",
                &videasy,
                vec![
                    attempt("backup1-videasy", &videasy, None, Some(".m3u8")),
                    attempt("backup1-vidlink", &vidlink, None, Some(".m3u8")),
                ],
                probes.clone(),
            ),
            ServerProfile::new(
                "backup2",
                &videasy,
                vec![
                    attempt("backup2-simple", &videasy, None, None),
                    attempt("backup2-vidlink-simple", &vidlink, None, None),
                ],
                probes,
            ),
        ];

        Self::new("hosted", profiles, default_server)
    }

    /// one scraper instance per server, each listening on its own port. vienna scrapes vidlink,
    /// every other server scrapes videasy
    pub fn self_hosted(
        host: &str,
        ports: &[(String, u16)],
        videasy: PlayerSite,
        vidlink: PlayerSite,
        timeout: Duration,
        default_server: &str,
    ) -> anyhow::Result<Self> {
        let probes = vec![videasy.clone(), vidlink.clone()];

        let profiles = ports
            .iter()
            .map(|(id, port)| {
                let site = if id == "vienna" { &vidlink } else { &videasy };
                let scraper = format!("http://{}:{}/api/scrape", host, port);
                let attempts = vec![
                    AttemptTemplate {
                        name: format!("{}-selfhosted", id),
                        site: site.clone(),
                        scraper: scraper.clone(),
                        click_selector: None,
                        wait_for: Some(".m3u8".to_string()),
                        timeout,
                    },
                    AttemptTemplate {
                        name: format!("{}-selfhosted-simple", id),
                        site: site.clone(),
                        scraper,
                        click_selector: None,
                        wait_for: None,
                        timeout,
                    },
                ];
                ServerProfile::new(id, site, attempts, probes.clone())
            })
            .collect();

        Self::new("self-hosted", profiles, default_server)
    }

    /// unknown ids get the default profile
    pub fn get(&self, id: &ServerId) -> &ServerProfile {
        self.profiles
            .iter()
            .find(|p| &p.id == id)
            .unwrap_or(&self.profiles[self.default_index])
    }

    pub fn default_profile(&self) -> &ServerProfile {
        &self.profiles[self.default_index]
    }

    pub fn ids(&self) -> Vec<ServerId> {
        self.profiles.iter().map(|p| p.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ServerTable {
        ServerTable::hosted(
            "https://scraper.test/api/scrape",
            PlayerSite::videasy(),
            PlayerSite::vidlink(),
            Duration::from_secs(30),
            "veronica",
        )
        .unwrap()
    }

    #[test]
    fn encoded_style_encodes_target_and_selectors() {
        let req = StreamRequest::movie("550", "veronica").unwrap();
        let attempts = table().get(&ServerId::new("veronica")).attempts_for(&req);

        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[0].name, "videasy-main");
        assert_eq!(
            attempts[0].scrape_request_url,
            "https://scraper.test/api/scrape?url=https%3A%2F%2Fplayer.videasy.net%2Fmovie%2F550&clickSelector=.play-icon-main&waitFor=.m3u8"
        );
        assert_eq!(
            attempts[2].scrape_request_url,
            "https://scraper.test/api/scrape?url=https%3A%2F%2Fplayer.videasy.net%2Fmovie%2F550"
        );
    }

    #[test]
    fn raw_style_passes_target_through() {
        let req = StreamRequest::tv("1399", "1", "2", "vienna").unwrap();
        let attempts = table().get(&ServerId::new("vienna")).attempts_for(&req);

        assert_eq!(
            attempts[0].scrape_request_url,
            "https://scraper.test/api/scrape?url=https://vidlink.pro/tv/1399/1/2&waitFor=.m3u8"
        );
    }

    #[test]
    fn unknown_server_falls_back_to_default() {
        let table = table();
        assert_eq!(table.get(&ServerId::new("ven")).id.as_str(), "veronica");
        assert_eq!(table.get(&ServerId::new("vienna")).id.as_str(), "vienna");
    }

    #[test]
    fn probe_urls_list_pages_before_playlists() {
        let req = StreamRequest::movie("7", "veronica").unwrap();
        let urls = table().default_profile().probe_urls(&req);

        assert_eq!(
            urls,
            vec![
                "https://player.videasy.net/movie/7",
                "https://vidlink.pro/movie/7",
                "https://player.videasy.net/movie/7/playlist.m3u8",
                "https://vidlink.pro/movie/7/playlist.m3u8",
            ]
        );
    }

    #[test]
    fn self_hosted_builds_one_profile_per_port() {
        let table = ServerTable::self_hosted(
            "10.0.0.2",
            &[("veronica".to_string(), 3001), ("vienna".to_string(), 3002)],
            PlayerSite::videasy(),
            PlayerSite::vidlink(),
            Duration::from_secs(5),
            "missing",
        )
        .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.default_profile().id.as_str(), "veronica");

        let vienna = table.get(&ServerId::new("vienna"));
        assert_eq!(vienna.scrape_param_style, ScrapeParamStyle::Raw);
        assert!(
            vienna.attempts[0]
                .scraper
                .starts_with("http://10.0.0.2:3002/")
        );
    }

    #[test]
    fn empty_table_is_an_error() {
        assert!(ServerTable::self_hosted(
            "h",
            &[],
            PlayerSite::videasy(),
            PlayerSite::vidlink(),
            Duration::from_secs(1),
            "x"
        )
        .is_err());
    }
}
