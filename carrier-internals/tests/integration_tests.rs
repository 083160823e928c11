//! Integration tests for the carrier-internals crate.
//!
//! The suite drives the thread-scoped registry the way the `carrier` crate
//! does, through tokens and raw ids only:
//!
//! ## Balance
//! - `test_open_close_balance`: depth returns to zero after any balanced
//!   sequence of opens and closes
//! - `test_shared_token_shares_frame`: opening the same type twice from one
//!   scope does not add a frame
//!
//! ## Values
//! - `test_last_write_wins`: the innermost frame keeps the latest value
//! - `test_round_trip`: a stored value is read back under its id only
//! - `test_propagation_to_enclosing_frame`: closing a frame moves its value
//!   outward
//! - `test_discard_without_enclosing_frame`: closing the outermost frame
//!   hands the value back
//! - `test_put_without_frame`: values for unopened types are returned
//!
//! ## Ordering and threads
//! - `test_out_of_order_close`: guards released in a different order keep the
//!   remaining frames consistent
//! - `test_threads_are_isolated`: frames opened on one thread are invisible on
//!   another
//! - `test_reentrant_with_value`: the closure of `with_value` may use the
//!   registry
//! - `test_with_value_restores_after_panic`: a panicking closure does not
//!   lose the value it was lent

use std::{cell::Cell, num::NonZeroU32, rc::Rc};

use carrier_internals::{Closed, ScopeToken, registry};

#[derive(Debug, PartialEq)]
struct Code(i32);

#[derive(Debug, PartialEq)]
struct Name(&'static str);

fn id(raw: u32) -> NonZeroU32 {
    NonZeroU32::new(raw).unwrap()
}

#[test]
fn test_open_close_balance() {
    let tokens: Vec<_> = (0..5).map(|_| ScopeToken::next()).collect();
    for token in &tokens {
        registry::open::<Code>(*token);
        registry::open::<Name>(*token);
    }
    assert_eq!(registry::depth::<Code>(), 5);
    for token in tokens.iter().rev() {
        assert!(matches!(registry::close::<Name>(*token), Closed::Released));
        assert!(matches!(registry::close::<Code>(*token), Closed::Released));
    }
    assert_eq!(registry::depth::<Code>(), 0);
    assert_eq!(registry::depth::<Name>(), 0);
    assert!(!registry::is_open::<Code>());
    assert!(matches!(
        registry::close::<Code>(ScopeToken::next()),
        Closed::NotOpen
    ));
}

#[test]
fn test_shared_token_shares_frame() {
    let token = ScopeToken::next();
    assert_eq!(registry::open::<Code>(token), 1);
    assert_eq!(registry::open::<Code>(token), 1);
    assert!(matches!(registry::close::<Code>(token), Closed::Retained));
    assert!(registry::is_open::<Code>());
    assert!(matches!(registry::close::<Code>(token), Closed::Released));
    assert!(!registry::is_open::<Code>());
}

#[test]
fn test_last_write_wins() {
    let token = ScopeToken::next();
    registry::open::<Code>(token);
    assert_eq!(registry::put(id(5), Code(1)), Ok(None));
    assert_eq!(registry::put(id(5), Code(2)), Ok(Some(Code(1))));
    assert_eq!(registry::put(id(9), Code(3)), Ok(Some(Code(2))));
    assert!(!registry::has_value::<Code>(id(5)));
    assert_eq!(registry::extract::<Code>(id(9)), Some(Code(3)));
    let _ = registry::close::<Code>(token);
}

#[test]
fn test_round_trip() {
    let token = ScopeToken::next();
    registry::open::<Name>(token);
    registry::put(id(13), Name("payload")).unwrap();
    assert_eq!(registry::top_id::<Name>(), Some(id(13)));
    assert_eq!(registry::with_value::<Name, _>(id(17), |name| name.0), None);
    assert_eq!(
        registry::with_value::<Name, _>(id(13), |name| name.0),
        Some("payload")
    );
    assert_eq!(registry::extract::<Name>(id(13)), Some(Name("payload")));
    assert_eq!(registry::extract::<Name>(id(13)), None);
    let _ = registry::close::<Name>(token);
}

#[test]
fn test_propagation_to_enclosing_frame() {
    let outer = ScopeToken::next();
    let inner = ScopeToken::next();
    registry::open::<Code>(outer);
    registry::put(id(1), Code(10)).unwrap();
    registry::open::<Code>(inner);
    assert!(!registry::has_value::<Code>(id(1)));
    registry::put(id(5), Code(7)).unwrap();

    match registry::close::<Code>(inner) {
        Closed::Propagated { id: moved, replaced } => {
            assert_eq!(moved, id(5));
            assert_eq!(replaced, Some(Code(10)));
        }
        other => panic!("unexpected close result {other:?}"),
    }
    assert_eq!(registry::extract::<Code>(id(5)), Some(Code(7)));
    let _ = registry::close::<Code>(outer);
}

#[test]
fn test_discard_without_enclosing_frame() {
    let token = ScopeToken::next();
    registry::open::<Code>(token);
    registry::put(id(21), Code(4)).unwrap();
    match registry::close::<Code>(token) {
        Closed::Discarded { id: dropped, value } => {
            assert_eq!(dropped, id(21));
            assert_eq!(value, Code(4));
        }
        other => panic!("unexpected close result {other:?}"),
    }
}

#[test]
fn test_put_without_frame() {
    assert_eq!(registry::put(id(1), Code(3)), Err(Code(3)));
    assert!(!registry::update_top::<Code>(|pair| pair));
}

#[test]
fn test_out_of_order_close() {
    let outer = ScopeToken::next();
    let middle = ScopeToken::next();
    let inner = ScopeToken::next();
    registry::open::<Code>(outer);
    registry::open::<Code>(middle);
    registry::put(id(1), Code(1)).unwrap();
    registry::open::<Code>(inner);

    // The middle guard goes first: its value moves to the outer frame and the
    // inner frame stays on top.
    assert!(matches!(
        registry::close::<Code>(middle),
        Closed::Propagated { replaced: None, .. }
    ));
    assert_eq!(registry::depth::<Code>(), 2);
    assert!(!registry::has_value::<Code>(id(1)));
    let _ = registry::close::<Code>(inner);
    assert_eq!(registry::extract::<Code>(id(1)), Some(Code(1)));
    let _ = registry::close::<Code>(outer);
    assert_eq!(registry::depth::<Code>(), 0);
}

#[test]
fn test_threads_are_isolated() {
    let token = ScopeToken::next();
    registry::open::<Code>(token);
    registry::put(id(1), Code(1)).unwrap();
    std::thread::spawn(|| {
        assert!(!registry::is_open::<Code>());
        assert_eq!(registry::put(id(1), Code(2)), Err(Code(2)));
    })
    .join()
    .unwrap();
    assert!(registry::has_value::<Code>(id(1)));
    let _ = registry::close::<Code>(token);
}

#[test]
fn test_reentrant_with_value() {
    let token = ScopeToken::next();
    registry::open::<Code>(token);
    registry::open::<Name>(token);
    registry::put(id(3), Code(3)).unwrap();

    let seen = Rc::new(Cell::new(0));
    let inner = Rc::clone(&seen);
    let result = registry::with_value::<Code, _>(id(3), move |code| {
        // The value is out of its frame while the closure runs.
        assert!(!registry::has_value::<Code>(id(3)));
        registry::put(id(3), Name("from closure")).unwrap();
        inner.set(code.0);
        code.0 * 2
    });
    assert_eq!(result, Some(6));
    assert_eq!(seen.get(), 3);
    assert!(registry::has_value::<Code>(id(3)));
    assert_eq!(registry::extract::<Name>(id(3)), Some(Name("from closure")));
    assert!(registry::registered_types() >= 2);

    let _ = registry::close::<Name>(token);
    let _ = registry::close::<Code>(token);
}

#[test]
fn test_with_value_restores_after_panic() {
    let token = ScopeToken::next();
    registry::open::<Code>(token);
    registry::put(id(4), Code(4)).unwrap();

    let result = std::panic::catch_unwind(|| {
        registry::with_value::<Code, ()>(id(4), |_| panic!("closure failed"))
    });
    assert!(result.is_err());
    assert_eq!(registry::extract::<Code>(id(4)), Some(Code(4)));
    let _ = registry::close::<Code>(token);
}
