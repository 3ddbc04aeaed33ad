use crate::dns::tsig::{Algorithm, TsigKey};
use crate::error::Error;
use ipnetwork::IpNetwork;
use lazy_static::lazy_static;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, DurationSeconds};
use std::fs::File;
use std::io::BufReader;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub type SharedConfig = Arc<Config>;

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub dns_udp_bind_addr: SocketAddr,
    pub api_bind_addr: SocketAddr,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub api_timeout: Duration,
    pub store_path: PathBuf,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_store_open_timeout")]
    pub store_open_timeout: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval: Duration,
    #[serde(default)]
    pub tsig: Option<TsigConfig>,
    #[serde(default = "default_require_authenticated_updates")]
    pub require_authenticated_updates: bool,
    /// Lifetime given to records added by dynamic updates. Unset means they never expire.
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub update_expiry: Option<Duration>,
}

/// The shared secret dynamic updates are signed with.
#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct TsigConfig {
    pub name: String,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default)]
    pub algorithm: Algorithm,
    /// Base64 encoded secret, as printed by `tsig-keygen`.
    pub secret: String,
}

impl TsigConfig {
    /// # Errors
    ///
    /// Returns an error if the key name or the secret are malformed.
    pub fn key(&self) -> Result<TsigKey, Error> {
        TsigKey::from_base64(&self.name, self.algorithm, &self.secret)
    }
}

fn default_store_open_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_reaper_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_require_authenticated_updates() -> bool {
    true
}

lazy_static! {
    // NOTE(XXX): Once the "ip" feature has stabilized we can use Ipv6Addr.is_unique_local[0].
    //            Presently this feature is unstable so we home-roll. See also RFC 4193[1].
    // [0]: https://doc.rust-lang.org/std/net/struct.Ipv6Addr.html#method.is_unique_local
    // [1]: https://www.rfc-editor.org/rfc/rfc4193.html
    static ref IPV6_UNIQUE_LOCAL_NETWORK: IpNetwork = IpNetwork::from_str("fc00::/7").unwrap();
}

impl Config {
    /// Load and validate the config stored at `p`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or parsed, if the API bind address isn't
    /// loopback or private, or if the TSIG key is malformed.
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let f = File::open(p)?;
        let reader = BufReader::new(f);
        let conf: Config = serde_json::from_reader(reader)?;
        conf.validate()?;
        Ok(conf)
    }

    /// # Errors
    ///
    /// See [`Config::try_from_file`].
    pub fn validate(&self) -> Result<(), Error> {
        self.bind_addr_is_secure()?;
        self.tsig_key()?;
        Ok(())
    }

    /// The configured TSIG key, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the key name or the secret are malformed.
    pub fn tsig_key(&self) -> Result<Option<TsigKey>, Error> {
        self.tsig.as_ref().map(TsigConfig::key).transpose()
    }

    fn bind_addr_is_secure(&self) -> Result<(), Error> {
        match self.api_bind_addr {
            SocketAddr::V4(v4_addr) => {
                let ip = v4_addr.ip();
                if !ip.is_loopback() && !ip.is_private() {
                    return Err(Error::InsecureAPIBind(IpAddr::V4(*ip)));
                }
                Ok(())
            }
            SocketAddr::V6(v6_addr) => {
                let ip = v6_addr.ip();
                if !ip.is_loopback() && !IPV6_UNIQUE_LOCAL_NETWORK.contains(IpAddr::V6(*ip)) {
                    return Err(Error::InsecureAPIBind(IpAddr::V6(*ip)));
                }
                Ok(())
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dns_udp_bind_addr: SocketAddr::from(([127, 0, 0, 1], 5353)),
            api_bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            api_timeout: Duration::from_secs(5),
            store_path: PathBuf::from("ddns.redb"),
            store_open_timeout: default_store_open_timeout(),
            reaper_interval: default_reaper_interval(),
            tsig: None,
            require_authenticated_updates: default_require_authenticated_updates(),
            update_expiry: None,
        }
    }
}
