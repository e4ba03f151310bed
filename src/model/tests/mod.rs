#![cfg(test)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{Formula, Value};

mod basic;
mod dynamic;

/// A formula adding up the integers `names` resolve to.
fn sum(names: &'static [&'static str]) -> Formula {
    Formula::nullary(move |scope| {
        let mut total = 0;
        for name in names {
            total += scope.get(name)?.as_int()?;
        }
        Ok(Value::Int(total))
    })
}

/// Like [`sum`], but bumps `runs` every time it is evaluated.
fn counted_sum(runs: &Arc<AtomicUsize>, names: &'static [&'static str]) -> Formula {
    let runs = runs.clone();
    let inner = sum(names);
    Formula::nullary(move |scope| {
        runs.fetch_add(1, Ordering::SeqCst);
        inner.evaluate(scope)
    })
}

fn runs(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
