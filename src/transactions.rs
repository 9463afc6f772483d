//! Nested transaction bookkeeping

use std::fmt;
use std::sync::Arc;

use crate::{Error, Result};

pub(crate) const NO_TRANSACTION: &str =
   "Cannot perform this operation because there is no current transaction.";

pub(crate) const ALREADY_MARKED_SUCCESSFUL: &str = "Cannot perform this operation because the transaction has already been marked successful. The only thing you can do now is call end_transaction().";

/// How the outermost `BEGIN` acquires its locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
   /// `BEGIN DEFERRED`: no lock until the first read or write.
   Deferred,
   /// `BEGIN IMMEDIATE`: takes the write lock, readers may continue.
   Immediate,
   /// `BEGIN EXCLUSIVE`
   Exclusive,
}

impl TransactionMode {
   pub(crate) fn begin_sql(self) -> &'static str {
      match self {
         TransactionMode::Deferred => "BEGIN DEFERRED;",
         TransactionMode::Immediate => "BEGIN IMMEDIATE;",
         TransactionMode::Exclusive => "BEGIN EXCLUSIVE;",
      }
   }
}

/// Callbacks for the lifecycle of one transaction frame.
///
/// `on_commit` or `on_rollback` runs when the frame ends, before the outermost
/// frame issues `COMMIT` or `ROLLBACK`. An error from `on_begin` undoes the
/// begin; an error from `on_commit` turns the frame into a rollback.
pub trait TransactionListener: Send + Sync {
   fn on_begin(&self) -> Result<()> {
      Ok(())
   }

   fn on_commit(&self) -> Result<()> {
      Ok(())
   }

   fn on_rollback(&self) -> Result<()> {
      Ok(())
   }
}

struct Frame {
   listener: Option<Arc<dyn TransactionListener>>,
   marked_successful: bool,
   child_failed: bool,
}

/// A frame removed by [`TransactionStack::end`].
pub(crate) struct EndedFrame {
   pub(crate) listener: Option<Arc<dyn TransactionListener>>,
   /// Marked successful with no failed child
   pub(crate) successful: bool,
   /// No frames remain, so the caller must commit or roll back
   pub(crate) outermost: bool,
}

/// The frames of the transactions begun on a handle, innermost last.
///
/// Only the outermost frame maps to a real SQLite transaction. Inner frames
/// just record whether they were marked successful; an inner frame that ends
/// without success forces the whole transaction to roll back.
#[derive(Default)]
pub(crate) struct TransactionStack {
   frames: Vec<Frame>,
}

impl TransactionStack {
   pub(crate) fn depth(&self) -> usize {
      self.frames.len()
   }

   pub(crate) fn is_empty(&self) -> bool {
      self.frames.is_empty()
   }

   fn check_not_marked(&self) -> Result<()> {
      match self.frames.last() {
         Some(top) if top.marked_successful => {
            Err(Error::IllegalState(ALREADY_MARKED_SUCCESSFUL.to_string()))
         }
         _ => Ok(()),
      }
   }

   /// Fails when the current frame was already marked successful.
   pub(crate) fn check_can_begin(&self) -> Result<()> {
      self.check_not_marked()
   }

   pub(crate) fn push(&mut self, listener: Option<Arc<dyn TransactionListener>>) {
      self.frames.push(Frame {
         listener,
         marked_successful: false,
         child_failed: false,
      });
   }

   /// Drops the frame just pushed after its begin failed.
   pub(crate) fn discard_top(&mut self) {
      self.frames.pop();
   }

   pub(crate) fn mark_successful(&mut self) -> Result<()> {
      self.check_not_marked()?;
      let top = self
         .frames
         .last_mut()
         .ok_or_else(|| Error::IllegalState(NO_TRANSACTION.to_string()))?;
      top.marked_successful = true;
      Ok(())
   }

   /// Pops the innermost frame.
   pub(crate) fn end(&mut self) -> Result<EndedFrame> {
      let top = self
         .frames
         .pop()
         .ok_or_else(|| Error::IllegalState(NO_TRANSACTION.to_string()))?;
      Ok(EndedFrame {
         listener: top.listener,
         successful: top.marked_successful && !top.child_failed,
         outermost: self.frames.is_empty(),
      })
   }

   /// Records how an inner frame finished. A failure poisons the parent.
   pub(crate) fn child_finished(&mut self, successful: bool) {
      if !successful && let Some(parent) = self.frames.last_mut() {
         parent.child_failed = true;
      }
   }

   pub(crate) fn clear(&mut self) {
      self.frames.clear();
   }
}

impl fmt::Debug for TransactionStack {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("TransactionStack")
         .field("depth", &self.frames.len())
         .finish()
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn end(stack: &mut TransactionStack) -> EndedFrame {
      let frame = stack.end().unwrap();
      stack.child_finished(frame.successful);
      frame
   }

   #[test]
   fn test_single_frame() {
      let mut stack = TransactionStack::default();
      stack.push(None);
      stack.mark_successful().unwrap();
      let frame = end(&mut stack);
      assert!(frame.successful);
      assert!(frame.outermost);
      assert!(stack.is_empty());
   }

   #[test]
   fn test_unmarked_frame_rolls_back() {
      let mut stack = TransactionStack::default();
      stack.push(None);
      assert!(!end(&mut stack).successful);
   }

   #[test]
   fn test_no_transaction_errors() {
      let mut stack = TransactionStack::default();
      match stack.end() {
         Err(Error::IllegalState(msg)) => assert_eq!(msg, NO_TRANSACTION),
         _ => panic!("expected IllegalState"),
      }
      assert!(matches!(stack.mark_successful(), Err(Error::IllegalState(_))));
   }

   #[test]
   fn test_marked_frame_rejects_mark_and_begin() {
      let mut stack = TransactionStack::default();
      stack.push(None);
      stack.mark_successful().unwrap();
      match stack.mark_successful() {
         Err(Error::IllegalState(msg)) => assert_eq!(msg, ALREADY_MARKED_SUCCESSFUL),
         _ => panic!("expected IllegalState"),
      }
      assert!(stack.check_can_begin().is_err());
      assert!(end(&mut stack).successful);
   }

   #[test]
   fn test_inner_rollback_fails_outer() {
      let mut stack = TransactionStack::default();
      stack.push(None);
      stack.push(None);
      let inner = end(&mut stack);
      assert!(!inner.successful);
      assert!(!inner.outermost);

      stack.mark_successful().unwrap();
      let outer = end(&mut stack);
      assert!(outer.outermost);
      assert!(!outer.successful);
   }

   #[test]
   fn test_outer_rollback_overrides_inner_success() {
      let mut stack = TransactionStack::default();
      stack.push(None);
      stack.push(None);
      stack.mark_successful().unwrap();
      assert!(end(&mut stack).successful);
      assert_eq!(stack.depth(), 1);
      assert!(!end(&mut stack).successful);
   }
}
