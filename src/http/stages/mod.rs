// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Pipeline stages
//!
//! Default order, outermost first:
//!
//! 1. `error-replay`: client only, answers with an error recorded by the server render
//! 2. `error-record`: server only, records failed calls; sees decrypted bodies
//!    because `encryption` runs inside it
//! 3. `cookie-forward`: server only, forwards the visitor's cookie to the API
//! 4. `encryption`: client only, seals requests and opens replies next to the transport

pub mod cookie_forward;
pub mod encryption;
pub mod error_state;

pub use cookie_forward::CookieForwardStage;
pub use encryption::{
    EncryptionPolicy, EncryptionStage, ENCRYPTED_HEADER, ENCRYPTED_RESPONSE_HEADER, NONCE_HEADER,
};
pub use error_state::{error_key, ErrorRecordStage, ErrorReplayStage};
