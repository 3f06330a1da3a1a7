//! This library provides a Rust implementation of the protocol core of [OID4VCI].
//!
//! [OID4VCI]: <https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html>
//!
//! It covers both parties of the issuance flow: the wallet, which receives a credential offer
//! and asks the authorization server for access, and the issuer, which tracks offer sessions
//! and hands out credentials bound to a proof of possession. Transport servers, signatures and
//! credential formats are left to the caller.
//!
//! # Wallet Usage
//!
//! Wallets can be implemented by using the [`Wallet`] trait:
//!
//! ```ignore
//! use oid4vci::wallet::Wallet;
//! use oid4vci::core::authorization_request::AuthorizationRequestOpts;
//! use oid4vci::core::authorization_request::parameters::Pkce;
//!
//! struct MyWallet {
//!     http_client: MyHttpClient,
//! }
//!
//! #[async_trait]
//! impl Wallet for MyWallet {
//!     type HttpClient = MyHttpClient;
//!
//!     fn http_client(&self) -> &Self::HttpClient {
//!         &self.http_client
//!     }
//! }
//!
//! // Decode the offer, whatever draft it follows, and fetch it if passed by reference.
//! let offer = wallet.resolve_offer(offer_uri).await?;
//!
//! // Merge the credential issuer and authorization server metadata.
//! let metadata = wallet.resolve_metadata(&offer).await?;
//!
//! // Send the user to the authorization server.
//! let pkce = Pkce::generate();
//! let url = wallet
//!     .authorization_url(&offer, &metadata, &pkce, AuthorizationRequestOpts::new(redirect_uri))
//!     .await?;
//! ```
//!
//! [`Wallet`]: crate::wallet::Wallet
//!
//! # Issuer Usage
//!
//! ```ignore
//! use oid4vci::issuer::{Issuer, TokenGrant};
//! use oid4vci::issuer::offer::CreateOfferOptions;
//! use oid4vci::issuer::session::MemoryStore;
//!
//! let issuer = Issuer::builder()
//!     .with_config(config)
//!     .with_session_store(Arc::new(MemoryStore::new()))
//!     .with_nonce_store(Arc::new(MemoryStore::new()))
//!     .with_proof_verifier(Arc::new(verifier))
//!     .with_credential_signer(Arc::new(signer))
//!     .build()?;
//!
//! // Create an offer and show its URI to the user.
//! let created = issuer
//!     .create_credential_offer_uri(CreateOfferOptions::new(offered).with_grants(grants))
//!     .await?;
//!
//! // From the token endpoint: advance the session and hand out the first c_nonce.
//! let nonce = issuer.access_token_created(&grant, None).await?;
//!
//! // From the credential endpoint.
//! let response = issuer.issue_credential(&credential_request, None).await?;
//! ```
//!
//! # Draft Support
//!
//! Credential offers of drafts 9, 11, 12 and 13 are decoded into one canonical shape; see
//! [`core::version::Version`] and [`core::credential_offer`].

pub mod config;
pub mod core;
pub mod error;
pub mod issuer;
pub mod wallet;

pub use error::{Error, ErrorResponse, Result};
