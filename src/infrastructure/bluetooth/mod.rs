//! Bluetooth Module
//!
//! Provides BLE communication with a LEGO hub running Pybricks firmware.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    BluetoothService                      │
//! │  (worker thread - receives commands from the GUI)        │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌───────────┐  ┌────────────┐  ┌────────────┐
//! │  Scanner  │  │ Connection │  │  Session   │
//! │           │  │            │  │            │
//! │ - BLE     │  │ - GATT     │  │ - Program  │
//! │ discovery │  │ - Notify   │  │   load/run │
//! │           │  │ - Startup  │  │ - Stdin    │
//! └───────────┘  └────────────┘  └─────┬──────┘
//!                                      ▼
//!                                ┌────────────┐
//!                                │  Protocol  │
//!                                └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Pybricks UUIDs, command encoding, and event parsing
//! - [`session`] - Command flow over an abstract [`session::HubLink`]
//! - [`scanner`] - BLE device discovery
//! - [`connection`] - Connection handshake and notification handling
//! - [`service`] - Worker loop coordinating everything

pub mod connection;
pub mod error;
pub mod protocol;
pub mod scanner;
pub mod service;
pub mod session;

pub use service::spawn_worker;
