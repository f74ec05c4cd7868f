mod action;
mod dump;
mod error;
mod handler;
mod redirect;
mod request;
mod response;
mod server;

pub mod codec;
pub mod csv;
pub mod header;
pub mod html;
pub mod reader;
pub mod router;
pub mod scalar;
pub mod writer;

pub use action::Action;
pub use action::Flow;
pub use action::Step;
pub use action::execute_action;
pub use codec::{Form, Json, Text, Xml};
pub use dump::RequestDump;
pub use error::BoxError;
pub use error::Error;
pub use handler::FnInitializer;
pub use handler::Handler;
pub use handler::HandlerInitializer;
pub use handler::init_fn;
pub use handler::serve;
pub use redirect::Redirect;
pub use request::PathParams;
pub use request::QueryValues;
pub use request::RequestBody;
pub use request::RequestContext;
pub use response::ResponseBody;
pub use response::ResponseSink;
pub use response::SinkWriter;
pub use router::Router;
pub use router::RouterBuilder;
pub use server::Server;
pub use server::ServerBuildError;
pub use server::ServerBuilder;
