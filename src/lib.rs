//! Stakeflow: task lifecycle engine for boosting, unboosting and redeeming a
//! staked balance against an external ledger.
//!
//! Every workflow is a persisted task that interval-driven workers move
//! forward once the ledger's waiting periods have elapsed. Submissions are
//! serialised through one transaction lock, and every step is recorded in an
//! append-only event log.
//!
//! # Architecture
//!
//! Stakeflow follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (`SQLite`, in-memory)
//!
//! # Modules
//!
//! - [`task`]: Task state machine, store port and adapters
//! - [`ledger`]: Ledger port, simulated ledger and condition oracle
//! - [`txlock`]: Transaction serialisation lock
//! - [`pipeline`]: Unboost, redeem and boost drivers
//! - [`worker`]: Interval scheduler for the drivers
//! - [`status`]: Cached ledger status
//! - [`engine`]: Service wiring and caller facade
//! - [`config`] and [`logging`]: Ambient setup

pub mod clock;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod logging;
pub mod pipeline;
pub mod status;
pub mod task;
pub mod txlock;
pub mod worker;
