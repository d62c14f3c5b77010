//! Line input shared by the interactive adapters.
//!
//! The human gate and the terminal feedback channel read from the same stdin
//! lock, so they hold clones of one [`LineInput`].

use std::cell::RefCell;
use std::io::BufRead;
use std::rc::Rc;

use anyhow::{Context, Result};

pub struct LineInput<R> {
    inner: Rc<RefCell<R>>,
}

impl<R> Clone for LineInput<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<R: BufRead> LineInput<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: Rc::new(RefCell::new(reader)),
        }
    }

    /// Next line without its line terminator; `None` on EOF.
    pub fn read_line(&self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = self
            .inner
            .borrow_mut()
            .read_line(&mut line)
            .context("read terminal input")?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}
