//! # Mock Implementations for Testing
//!
//! mockall doubles for the enrichment source traits, so labeler and resolver
//! tests can assert exactly how often upstream is consulted.
//!
//! The chain connection has a hand-written double instead, see
//! [`crate::indexer::test_utils::MockChainProvider`].

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(dead_code)]

use std::collections::HashMap;

use mockall::mock;

use crate::enrichment::labels::LabelSource;
use crate::enrichment::prices::PriceSource;
use crate::errors::Result;
use crate::types::{Address, AddressLabel};

mock! {
    /// Label source double.
    ///
    /// ```rust,ignore
    /// let mut source = MockLabelSource::new();
    /// source.expect_lookup().never();
    /// ```
    pub LabelSource {}

    #[async_trait::async_trait]
    impl LabelSource for LabelSource {
        async fn lookup(&self, chain: &str, address: &Address) -> Result<Option<AddressLabel>>;
    }
}

mock! {
    /// Price source double; remember to stub `name()` when failures are logged.
    pub PriceSource {}

    #[async_trait::async_trait]
    impl PriceSource for PriceSource {
        fn name(&self) -> &str;
        async fn fetch_price(&self, chain: &str, token: &Address) -> Result<Option<f64>>;
        async fn fetch_prices(&self, chain: &str, tokens: &[Address]) -> Result<HashMap<Address, f64>>;
    }
}
