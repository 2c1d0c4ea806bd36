//! Integration tests for the HTTP remote store adapter, run against a
//! wiremock server

mod common;
mod test_blob;
mod test_rows;
mod test_stream;
