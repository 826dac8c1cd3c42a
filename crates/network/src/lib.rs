//! Endpoint transports for the hfc orchestrator.
//!
//! The orchestrator talks to four kinds of endpoints, each behind an
//! async trait in [`transport`]:
//!
//! ```text
//! ┌──────────────┐ register/enroll ┌─────────────────────┐
//! │              │────────────────▶│ CertificateAuthority │
//! │              │ join/proposals  ├─────────────────────┤
//! │ orchestrator │────────────────▶│ PeerNode            │
//! │              │ create/broadcast├─────────────────────┤
//! │              │────────────────▶│ OrdererNode         │
//! │              │◀────────────────│ EventHub            │
//! └──────────────┘  commit events  └─────────────────────┘
//! ```
//!
//! A [`Connector`] hands out endpoint handles. [`ca_http`] provides the
//! HTTP certificate authority client and [`mock`] an in-memory network used
//! by the tests and the CLI's `simulate` command.

pub mod ca_http;
pub mod commit;
pub mod error;
pub mod mock;
pub mod transport;

pub use ca_http::HttpCertificateAuthority;
pub use commit::{CommitError, CommitHandle, CommitOutcome, CommitResolver};
pub use error::{NetworkError, Result};
pub use mock::MockNetwork;
pub use transport::{
    CertificateAuthority, ChannelCreateRequest, ChannelGenesis, ConfigSignature, Connector,
    EventHub, JoinRequest, OrdererNode, PeerNode, RegistrationRequest,
};
