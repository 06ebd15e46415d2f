//! Shared state of the API handlers.

use std::sync::Arc;

use ots::calendar::CalendarPool;
use ots::oracle::BitcoinCoreClient;
use ots::oracle::EsploraClient;
use ots::oracle::HeaderOracle;
use tokio::sync::Mutex;

use crate::common::error::Error;
use crate::config::BitcoinConfig;
use crate::config::Settings;
use crate::config::StampConfig;
use crate::ledger::maintenance::ReceiptChecker;
use crate::rate_limit::RateLimiter;
use crate::receipts::ReceiptStore;

/// The calendar pool described by the stamp configuration.
pub fn calendar_pool(config: &StampConfig) -> Result<CalendarPool, Error> {
    CalendarPool::new(
        config.calendars.clone(),
        config.min_calendar_responses,
        config.timeout,
    )
    .map_err(Error::ClientSetup)
}

/// The block-header source described by the bitcoin configuration, if
/// one is configured.
pub fn header_oracle(config: &BitcoinConfig) -> Result<Option<HeaderOracle>, Error> {
    if let Some(endpoint) = &config.rpc_endpoint {
        let client = BitcoinCoreClient::try_from(endpoint).map_err(Error::ClientSetup)?;
        return Ok(Some(HeaderOracle::BitcoinCore(client)));
    }
    if let Some(url) = &config.esplora_url {
        let client = EsploraClient::new(url.clone(), config.timeout).map_err(Error::ClientSetup)?;
        return Ok(Some(HeaderOracle::Esplora(client)));
    }
    Ok(None)
}

/// API context
#[derive(Clone, Debug)]
pub struct ApiContext {
    /// Service settings
    pub settings: Settings,
    /// Calendars used for stamping
    pub calendars: CalendarPool,
    /// Block-header source for verification, if configured
    pub oracle: Option<HeaderOracle>,
    /// Per-client request limits for stamping
    pub rate_limiter: RateLimiter,
    /// Receipts created through the API
    pub receipts: ReceiptStore,
    /// Serializes writers of the ledger file
    pub ledger_lock: Arc<Mutex<()>>,
}

impl ApiContext {
    /// Build the context from validated settings.
    pub fn from_settings(settings: Settings) -> Result<Self, Error> {
        let calendars = calendar_pool(&settings.stamp)?;
        let oracle = header_oracle(&settings.bitcoin)?;
        if oracle.is_none() {
            tracing::info!("no block-header source configured, attestations are not checked");
        }

        Ok(Self {
            calendars,
            oracle,
            rate_limiter: RateLimiter::new(settings.rate_limit),
            receipts: ReceiptStore::new(settings.ledger.receipts_dir.clone()),
            ledger_lock: Arc::new(Mutex::new(())),
            settings,
        })
    }

    /// A checker resolving ledger receipts under the public directory.
    pub fn receipt_checker(&self) -> ReceiptChecker {
        ReceiptChecker::new(self.settings.ledger.public_dir.clone(), self.oracle.clone())
    }
}
