use std::sync::atomic::{AtomicUsize, Ordering};

use crate::common::error::{PipelineError, Result};

/// Round-robin over equivalent upstream endpoints
#[derive(Debug)]
pub struct RoundRobin {
    endpoints: Vec<String>,
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new(endpoints: Vec<String>) -> Result<Self> {
        let endpoints: Vec<String> = endpoints
            .into_iter()
            .map(|e| e.trim().trim_end_matches('/').to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if endpoints.is_empty() {
            return Err(PipelineError::Config("at least one endpoint is required".into()));
        }
        Ok(Self {
            endpoints,
            counter: AtomicUsize::new(0),
        })
    }

    pub fn next(&self) -> &str {
        let i = self.counter.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        &self.endpoints[i]
    }

    pub fn first(&self) -> &str {
        &self.endpoints[0]
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
