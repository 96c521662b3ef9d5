//! Integration tests for session delivery, the generation queue and configuration

mod test_utils;

mod provider_http;
mod server_routes;
