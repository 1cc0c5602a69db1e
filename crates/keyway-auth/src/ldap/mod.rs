//! LDAP/Active Directory connector
//!
//! Supports:
//! - LDAP (OpenLDAP, 389 Directory Server)
//! - Microsoft Active Directory
//! - TLS/STARTTLS connections

mod client;

pub use client::LdapDirectory;
