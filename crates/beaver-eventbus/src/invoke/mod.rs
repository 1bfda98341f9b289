//! Listener invocation.
//!
//! - [`HandlerSignature`] - registration-time description of a handler's
//!   parameters
//! - [`ListenerParameterResolver`] - derives the registry bucket and payload
//!   type from a signature
//! - [`PayloadAdapter`] - narrows exchange payloads to typed views
//! - [`EventInvoker`] - uniform callable run by the dispatcher, implemented
//!   by [`SubscribeInvoker`] (bean + method) and [`FnInvoker`] (closure)
//! - [`IntoListenerResult`] - conversion of handler return values

mod adapter;
mod invoker;
mod resolver;
mod result;
mod signature;

pub use adapter::{FilteringPayloadAdapter, PayloadAdapter};
pub use invoker::{
    EventInvoker, FnInvoker, HandlerMethod, ListenerResult, MethodFn, SubscribeInvoker,
};
pub use resolver::ListenerParameterResolver;
pub use result::IntoListenerResult;
pub use signature::{HandlerSignature, ParameterType, PayloadType, ViewFactory};
