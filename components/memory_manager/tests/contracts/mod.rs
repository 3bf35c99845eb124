//! Contract tests for the public memory_manager API.

mod api_contract;
