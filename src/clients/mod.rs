pub mod store_service_client;
