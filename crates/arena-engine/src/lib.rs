//! Transactional core of sats-arena.
//!
//! Wires the persistent store, ephemeral cache, Lightning adapter and
//! price oracle into the services that carry real money: the wallet
//! ledger, the buy-in/deposit payment pipeline, the per-attempt
//! debit/refund state machine with its anti-cheat gate, and the daily
//! tournament lifecycle with top-3 payouts.

pub mod anticheat;
pub mod attempts;
pub mod config;
pub mod error;
pub mod payments;
pub mod payouts;
pub mod scheduler;
pub mod tournament;
pub mod wallet;

pub use config::EngineConfig;
pub use error::{EngineError, Result};

use std::sync::Arc;

use arena_cache::Cache;
use arena_db::Database;
use arena_lightning::{LightningBackend, PriceSource};

use attempts::AttemptService;
use payments::PaymentService;
use payouts::PayoutDriver;
use tournament::TournamentService;
use wallet::WalletService;

/// All engine services, wired over shared adapters.
pub struct Engine {
    pub db: Database,
    pub cache: Arc<dyn Cache>,
    pub tournaments: Arc<TournamentService>,
    pub wallet: Arc<WalletService>,
    pub payments: Arc<PaymentService>,
    pub attempts: Arc<AttemptService>,
    pub payouts: Arc<PayoutDriver>,
    pub config: EngineConfig,
}

impl Engine {
    pub fn new(
        db: Database,
        cache: Arc<dyn Cache>,
        lightning: Arc<dyn LightningBackend>,
        price: Arc<dyn PriceSource>,
        config: EngineConfig,
    ) -> Self {
        let tournaments = Arc::new(TournamentService::new(db.clone(), config.clone()));
        let wallet = Arc::new(WalletService::new(
            db.clone(),
            cache.clone(),
            lightning.clone(),
            price.clone(),
            config.clone(),
        ));
        let payments = Arc::new(PaymentService::new(
            db.clone(),
            cache.clone(),
            lightning.clone(),
            wallet.clone(),
            config.clone(),
        ));
        let attempts = Arc::new(AttemptService::new(
            db.clone(),
            cache.clone(),
            price,
            tournaments.clone(),
            config.clone(),
        ));
        let payouts = Arc::new(PayoutDriver::new(db.clone(), lightning, config.clone()));

        Self {
            db,
            cache,
            tournaments,
            wallet,
            payments,
            attempts,
            payouts,
            config,
        }
    }
}
