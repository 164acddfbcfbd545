#[macro_use]
extern crate serde_derive;

extern crate k8s_openapi;

pub mod cloud;
pub mod error;
pub mod k8s;
pub mod os;
pub mod plenuslb;
