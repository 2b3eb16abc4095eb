//! Forward records and the pre/post-commit observer chains.
//!
//! Scope:
//! - A Forward is the write intent built by the command layer (db index, op name,
//!   raw args). It is threaded unchanged through both chains of a commit.
//! - Handlers run synchronously under the store gate, in registration order.
//!   Keep them fast; a handler must not call back into the same store (the gate
//!   is not reentrant).
//! - Handler errors are advisory: they are logged and counted, never propagated,
//!   and never stop the remaining handlers or the commit itself.

use log::warn;

/// In-flight write intent passed through the observer chains.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Forward {
    pub db: u32,
    pub op: String,
    pub args: Vec<Vec<u8>>,
}

impl Forward {
    pub fn new<S: Into<String>>(db: u32, op: S, args: Vec<Vec<u8>>) -> Self {
        Self {
            db,
            op: op.into(),
            args,
        }
    }
}

/// Commit observer.
pub trait ForwardHandler: Send + Sync {
    fn handle(&self, fw: &Forward) -> anyhow::Result<()>;
}

impl<F> ForwardHandler for F
where
    F: Fn(&Forward) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, fw: &Forward) -> anyhow::Result<()> {
        self(fw)
    }
}

/// Ordered handler list; invocation order == registration order.
pub(crate) struct ObserverChain {
    name: &'static str,
    handlers: Vec<Box<dyn ForwardHandler>>,
}

impl ObserverChain {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: Vec::new(),
        }
    }

    pub(crate) fn register(&mut self, h: Box<dyn ForwardHandler>) {
        self.handlers.push(h);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Run every handler; returns how many failed.
    pub(crate) fn invoke(&self, fw: &Forward) -> usize {
        let mut failed = 0;
        for (i, h) in self.handlers.iter().enumerate() {
            if let Err(e) = h.handle(fw) {
                failed += 1;
                warn!(
                    "{} handler #{} failed on {} (db={}) - {:#}",
                    self.name, i, fw.op, fw.db, e
                );
            }
        }
        failed
    }
}
