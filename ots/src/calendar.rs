//! Calendar server protocol
//!
//! Calendars aggregate submitted digests and periodically anchor them in
//! Bitcoin. The protocol has two calls:
//!
//! - `POST /digest` with the raw digest as body returns a timestamp for
//!   that digest, usually ending in a pending attestation for the
//!   calendar itself.
//! - `GET /timestamp/<hex commitment>` returns the upgraded timestamp for
//!   a commitment once the calendar has anchored it, or 404 while it is
//!   still pending.

use std::time::Duration;

use futures::future::join_all;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use url::Url;

use crate::detached::DetachedTimestampFile;
use crate::error::Error;
use crate::op::Op;
use crate::timestamp::Timestamp;

/// The calendars stamps are submitted to by default.
pub const DEFAULT_CALENDARS: [&str; 5] = [
    "https://a.pool.opentimestamps.org",
    "https://b.pool.opentimestamps.org",
    "https://alice.btc.calendar.opentimestamps.org",
    "https://bob.btc.calendar.opentimestamps.org",
    "https://finney.calendar.eternitywall.com",
];

/// The largest calendar response we accept.
pub const MAX_RESPONSE_SIZE: usize = 10_000;

/// Length of the random nonce appended to digests before submission.
pub const NONCE_SIZE: usize = 16;

/// Media type of serialized timestamps.
const OTS_MEDIA_TYPE: &str = "application/vnd.opentimestamps.v1";

/// What a calendar knows about a commitment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarResponse {
    /// The calendar returned a timestamp for the commitment.
    Upgraded(Timestamp),
    /// The calendar has not anchored the commitment yet.
    Pending,
}

/// A client for a single calendar server.
#[derive(Debug, Clone)]
pub struct CalendarClient {
    client: reqwest::Client,
    url: Url,
}

impl CalendarClient {
    /// Create a client for the calendar at `url` using a shared HTTP client.
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }

    /// The calendar URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let mut base = self.url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        base.join(path).map_err(|err| Error::InvalidUrl(err, self.url.clone()))
    }

    fn request_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::CalendarTimeout(self.url.clone())
        } else {
            Error::CalendarRequest(err, self.url.clone())
        }
    }

    /// Read the body chunk by chunk, giving up as soon as it grows past
    /// [`MAX_RESPONSE_SIZE`].
    async fn read_body(&self, mut response: reqwest::Response) -> Result<Vec<u8>, Error> {
        if let Some(len) = response.content_length() {
            if len > MAX_RESPONSE_SIZE as u64 {
                return Err(Error::CalendarResponseTooLarge(len as usize, self.url.clone()));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|err| self.request_error(err))? {
            let len = body.len() + chunk.len();
            if len > MAX_RESPONSE_SIZE {
                return Err(Error::CalendarResponseTooLarge(len, self.url.clone()));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    fn parse_timestamp(&self, body: &[u8], msg: &[u8]) -> Result<Timestamp, Error> {
        Timestamp::from_bytes(body, msg.to_vec())
            .map_err(|err| Error::CalendarMalformed(Box::new(err), self.url.clone()))
    }

    /// Submit a digest, returning the calendar's timestamp for it.
    #[tracing::instrument(skip_all, fields(calendar = %self.url))]
    pub async fn submit(&self, digest: &[u8]) -> Result<Timestamp, Error> {
        let url = self.endpoint("digest")?;
        let response = self
            .client
            .post(url)
            .header(ACCEPT, OTS_MEDIA_TYPE)
            .body(digest.to_vec())
            .send()
            .await
            .map_err(|err| self.request_error(err))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::CalendarStatus(status, self.url.clone()));
        }

        let body = self.read_body(response).await?;
        self.parse_timestamp(&body, digest)
    }

    /// Ask the calendar for the timestamp of a pending commitment.
    #[tracing::instrument(skip_all, fields(calendar = %self.url))]
    pub async fn get_timestamp(&self, commitment: &[u8]) -> Result<CalendarResponse, Error> {
        let url = self.endpoint(&format!("timestamp/{}", hex::encode(commitment)))?;
        let response = self
            .client
            .get(url)
            .header(ACCEPT, OTS_MEDIA_TYPE)
            .send()
            .await
            .map_err(|err| self.request_error(err))?;

        match response.status() {
            StatusCode::OK => {
                let body = self.read_body(response).await?;
                self.parse_timestamp(&body, commitment)
                    .map(CalendarResponse::Upgraded)
            }
            StatusCode::NOT_FOUND => Ok(CalendarResponse::Pending),
            status => Err(Error::CalendarStatus(status, self.url.clone())),
        }
    }
}

/// The result of an upgrade attempt.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpgradeOutcome {
    /// Whether any new attestation or operation was merged.
    pub changed: bool,
    /// Commitments the calendars still report as pending.
    pub still_pending: usize,
    /// Calendars that could not be asked, with the reason.
    pub failures: Vec<(String, String)>,
}

/// The set of calendars used for stamping, also the whitelist for
/// upgrades.
#[derive(Debug, Clone)]
pub struct CalendarPool {
    client: reqwest::Client,
    calendars: Vec<Url>,
    min_responses: usize,
}

impl CalendarPool {
    /// Create a pool. Every request is bounded by `timeout`.
    pub fn new(calendars: Vec<Url>, min_responses: usize, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| match calendars.first() {
                Some(url) => Error::CalendarRequest(err, url.clone()),
                None => Error::NotEnoughCalendars { got: 0, required: min_responses },
            })?;

        Ok(Self { client, calendars, min_responses })
    }

    /// The calendars in this pool.
    pub fn calendars(&self) -> &[Url] {
        &self.calendars
    }

    /// A client for one calendar, sharing the pool's HTTP client.
    pub fn client_for(&self, url: Url) -> CalendarClient {
        CalendarClient::new(self.client.clone(), url)
    }

    /// Whether `uri` names one of the calendars in this pool.
    pub fn is_whitelisted(&self, uri: &str) -> bool {
        let uri = uri.trim_end_matches('/');
        self.calendars
            .iter()
            .any(|url| url.as_str().trim_end_matches('/') == uri)
    }

    /// Stamp a SHA-256 file digest with a fresh random nonce.
    pub async fn stamp_digest(&self, digest: [u8; 32]) -> Result<DetachedTimestampFile, Error> {
        let nonce: [u8; NONCE_SIZE] = rand::random();
        self.stamp_digest_with_nonce(digest, nonce).await
    }

    /// Stamp a SHA-256 file digest: the digest is extended with `nonce`,
    /// hashed, and the result submitted to every calendar concurrently.
    ///
    /// The nonce keeps the digest private from the calendars, so it must be
    /// random outside of tests.
    #[tracing::instrument(skip_all, fields(digest = %hex::encode(digest)))]
    pub async fn stamp_digest_with_nonce(
        &self,
        digest: [u8; 32],
        nonce: [u8; NONCE_SIZE],
    ) -> Result<DetachedTimestampFile, Error> {
        let mut root = Timestamp::new(digest.to_vec());
        let commitment = root
            .add_op(Op::Append(nonce.to_vec()))?
            .add_op(Op::Sha256)?
            .msg()
            .to_vec();

        let clients: Vec<CalendarClient> = self
            .calendars
            .iter()
            .map(|url| self.client_for(url.clone()))
            .collect();
        let results = join_all(clients.iter().map(|client| client.submit(&commitment))).await;

        let mut accepted = 0;
        for (client, result) in clients.iter().zip(results) {
            let merged = result.and_then(|stamp| match root.find_mut(&commitment) {
                Some(tip) => tip.merge(stamp),
                None => Ok(()),
            });
            match merged {
                Ok(()) => accepted += 1,
                Err(error) => {
                    tracing::warn!(%error, calendar = %client.url(), "calendar submission failed")
                }
            }
        }

        if accepted < self.min_responses {
            return Err(Error::NotEnoughCalendars { got: accepted, required: self.min_responses });
        }
        tracing::info!(accepted, "digest submitted to calendars");

        DetachedTimestampFile::from_sha256(root)
    }

    /// Ask the calendars behind every pending attestation for an upgraded
    /// timestamp and merge what they return.
    ///
    /// Only whitelisted calendars are contacted. Commitments already
    /// anchored in Bitcoin are skipped. Calendar failures are collected in
    /// the outcome and leave the tree untouched.
    #[tracing::instrument(skip_all)]
    pub async fn upgrade_timestamp(&self, timestamp: &mut Timestamp) -> UpgradeOutcome {
        let pending: Vec<(Vec<u8>, String)> = timestamp
            .pending_attestations()
            .into_iter()
            .filter(|(commitment, _)| {
                !timestamp
                    .find(commitment)
                    .is_some_and(Timestamp::is_complete)
            })
            .map(|(commitment, uri)| (commitment.to_vec(), uri.to_string()))
            .collect();

        let mut outcome = UpgradeOutcome::default();
        for (commitment, uri) in pending {
            if !self.is_whitelisted(&uri) {
                tracing::debug!(%uri, "skipping calendar outside of the whitelist");
                outcome.failures.push((uri, "calendar is not whitelisted".to_string()));
                continue;
            }

            let url = match Url::parse(&uri) {
                Ok(url) => url,
                Err(err) => {
                    outcome.failures.push((uri, err.to_string()));
                    continue;
                }
            };

            let upgraded = match self.client_for(url).get_timestamp(&commitment).await {
                Ok(CalendarResponse::Upgraded(stamp)) => stamp,
                Ok(CalendarResponse::Pending) => {
                    outcome.still_pending += 1;
                    continue;
                }
                Err(error) => {
                    tracing::warn!(%error, %uri, "could not fetch upgraded timestamp");
                    outcome.failures.push((uri, error.to_string()));
                    continue;
                }
            };

            let Some(node) = timestamp.find_mut(&commitment) else {
                continue;
            };
            let before = node.clone();
            match node.merge(upgraded) {
                Ok(()) => outcome.changed |= *node != before,
                Err(error) => {
                    *node = before;
                    outcome.failures.push((uri, error.to_string()));
                }
            }
        }

        outcome
    }
}
