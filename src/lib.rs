//! RPKI signed object validation.
//!
//! The _Resource Public Key Infrastructure_ (RPKI) is an application of
//! PKI to Internet routing security. It allows owners of IP address
//! prefixes to publish cryptographically signed associations of their
//! prefixes to autonomous systems, allowing the validation of the origin
//! of a route announcement in BGP.
//!
//! This crate implements the validation core of a relying party: it takes
//! the objects a fetcher has placed on disk — trust anchor locators,
//! CA certificates, manifests, ROAs — and turns each of them into a
//! validated, typed value or a rejection. Every signature is verified
//! against the parent certificate handed in by the caller, every resource
//! delegation and profile rule checked along the way. Fetching,
//! scheduling and output formatting live elsewhere; the types herein are
//! pure functions from bytes to values, plus a small binary codec to ship
//! the values to an aggregating process.

pub mod binio;
pub mod cert;
pub mod cms;
pub mod der;
pub mod error;
pub mod ip;
pub mod log;
pub mod mft;
pub mod roa;
pub mod tal;
pub mod utils;
pub mod x509;

mod test;
