//! Saga timeout coordination.
//!
//! A competition creation spans two services without a shared
//! transaction. The coordinator gives the downstream step a deadline and
//! compensates by fanout rollback when it is missed; the registry is the
//! single shared structure the success and timeout paths race over.

mod coordinator;
mod registry;

pub use coordinator::SagaCoordinator;
pub use registry::SagaRegistry;
