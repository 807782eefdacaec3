#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mdm_pipeline::app::ports::{AddressParser, LookupProvider, RecordNormalizer};
use mdm_pipeline::common::LookupFailure;
use mdm_pipeline::domain::{AddressFields, LookupKey, LookupResult, Record};

pub fn sao_paulo() -> LookupResult {
    AddressFields {
        thoroughfare: Some("Avenida Paulista".to_string()),
        neighborhood: Some("Bela Vista".to_string()),
        city: Some("São Paulo".to_string()),
        state: Some("SP".to_string()),
        postal_code: Some("01310-100".to_string()),
        country_code: Some("BR".to_string()),
        ..AddressFields::default()
    }
}

pub fn key(raw: &str) -> LookupKey {
    LookupKey::parse(raw, None).expect("valid postal code")
}

/// Provider that replays scripted outcomes, then repeats a default one
pub struct ScriptedProvider {
    name: &'static str,
    countries: Option<Vec<&'static str>>,
    script: Mutex<VecDeque<Result<LookupResult, LookupFailure>>>,
    otherwise: Result<LookupResult, LookupFailure>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            countries: None,
            script: Mutex::new(VecDeque::new()),
            otherwise: Ok(LookupResult::empty()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn answering(mut self, outcome: Result<LookupResult, LookupFailure>) -> Self {
        self.otherwise = outcome;
        self
    }

    pub fn then(self, outcome: Result<LookupResult, LookupFailure>) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn only_for(mut self, countries: &[&'static str]) -> Self {
        self.countries = Some(countries.to_vec());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LookupProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports(&self, key: &LookupKey) -> bool {
        match &self.countries {
            Some(countries) => countries.contains(&key.country()),
            None => true,
        }
    }

    async fn lookup(&self, _key: &LookupKey) -> Result<LookupResult, LookupFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.otherwise.clone())
    }
}

/// Marks records as normalized; fails for the listed ids
#[derive(Default)]
pub struct MarkingNormalizer {
    pub fail_ids: Vec<&'static str>,
}

#[async_trait]
impl RecordNormalizer for MarkingNormalizer {
    async fn normalize(&self, record: &Record) -> anyhow::Result<Record> {
        if let Some(id) = record.id.as_deref() {
            if self.fail_ids.contains(&id) {
                anyhow::bail!("model timed out for {}", id);
            }
        }
        let mut out = Record::new(None);
        out.fields = record.fields.clone();
        out.set("normalized", true);
        Ok(out)
    }
}

/// Always answers with the same parse
pub struct FixedAddressParser(pub AddressFields);

#[async_trait]
impl AddressParser for FixedAddressParser {
    async fn parse_address(&self, _record: &Record) -> anyhow::Result<AddressFields> {
        Ok(self.0.clone())
    }
}

pub fn spawn_server(router: Router) -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(router.into_make_service());
    tokio::spawn(server);
    addr
}

/// An address nothing listens on
pub fn unused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
