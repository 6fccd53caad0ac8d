//! Behavioural scenarios for the command engine running against a local
//! shell session.

mod engine;
