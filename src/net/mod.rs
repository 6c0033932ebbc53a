pub mod http_proto;
pub mod router;
