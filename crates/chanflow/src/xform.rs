//! The reducing-step transducer protocol and the standard transducer library.
//!
//! A transducer is a function from a downstream [`Step`] to a new `Step`
//! that runs in front of it. Composing two transducers with [`comp`] nests
//! them so a value flows through the first transducer's logic, which then
//! feeds whatever it produces into the second, and so on down to the
//! channel's own buffer-writing step.
//!
//! Every standard transducer here is grounded in `chanpy.xf`'s reference
//! behaviour, re-expressed as a struct implementing [`Step`] rather than a
//! Python closure capturing the downstream `rf`.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// A one-variant-or-the-other marker: `Done` means "no further input may be
/// fed"; the value inside is never inspected by a channel (channels carry no
/// accumulator), but the wrapper lets transducers and tests reason about
/// early termination the way the reference implementation does.
pub enum Reduced<T> {
    Continue(T),
    Done(T),
}

impl<T> Reduced<T> {
    pub fn is_reduced(&self) -> bool {
        matches!(self, Reduced::Done(_))
    }

    pub fn ensure_reduced(self) -> Self {
        match self {
            Reduced::Continue(v) => Reduced::Done(v),
            done => done,
        }
    }

    pub fn unreduced(self) -> T {
        match self {
            Reduced::Continue(v) | Reduced::Done(v) => v,
        }
    }
}

/// A reducing step bound to a fixed downstream. `step` returns `true` when
/// no further input should be fed (the `Reduced` signal collapsed to a
/// plain bool, since channels never inspect the wrapped value).
pub trait Step<In>: Send {
    fn step(&mut self, val: In) -> bool;

    /// Flushes any retained state, forwarding what it produces through the
    /// same downstream chain used by `step`. Must be idempotent; `Chan`
    /// guarantees it is only ever called once.
    fn complete(&mut self);
}

pub type BoxStep<T> = Box<dyn Step<T> + Send>;

/// A transducer: a function from a downstream step to a new step that runs
/// in front of it. `In`/`Out` let shape-changing transducers (`cat`,
/// `partition_all`, ...) exist alongside the common value-wise case where
/// `In == Out`.
pub type Xform<In, Out> = Box<dyn FnOnce(BoxStep<Out>) -> BoxStep<In> + Send>;

/// `comp(xf1, xf2)` applied to a downstream `rf` is `xf1(xf2(rf))`: data
/// flows through `xf1`'s logic first, whatever it emits flows through
/// `xf2`, and only then reaches `rf`. This matches `chanpy.xf.comp`.
pub fn comp<A, B, C>(xf1: Xform<A, B>, xf2: Xform<B, C>) -> Xform<A, C>
where
    A: 'static,
    B: 'static,
    C: 'static,
{
    Box::new(move |rf: BoxStep<C>| xf1(xf2(rf)))
}

struct Collector<T> {
    sink: std::sync::Arc<std::sync::Mutex<Vec<T>>>,
}

impl<T: Send> Step<T> for Collector<T> {
    fn step(&mut self, val: T) -> bool {
        self.sink.lock().unwrap().push(val);
        false
    }

    fn complete(&mut self) {}
}

/// The terminal step of any channel's rf chain: collects whatever the
/// transducer ultimately emits for one input into a shared sink. `Chan`
/// keeps its own clone of the returned `Arc` and drains it after every
/// `rf.step`/`rf.complete` call, a value at a time, into the real buffer
/// (respecting each buffer kind's own `put` semantics, which a shared step
/// object has no access to).
pub(crate) fn collector<T: Send + 'static>() -> (BoxStep<T>, std::sync::Arc<std::sync::Mutex<Vec<T>>>) {
    let sink = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    (Box::new(Collector { sink: sink.clone() }) as BoxStep<T>, sink)
}

// -- value-wise -------------------------------------------------------------

struct MapStep<In, Out, F> {
    f: F,
    rf: BoxStep<Out>,
    _marker: std::marker::PhantomData<fn(In)>,
}

impl<In, Out, F> Step<In> for MapStep<In, Out, F>
where
    In: Send,
    Out: Send,
    F: FnMut(In) -> Out + Send,
{
    fn step(&mut self, val: In) -> bool {
        let out = (self.f)(val);
        self.rf.step(out)
    }

    fn complete(&mut self) {
        self.rf.complete();
    }
}

pub fn map<In, Out>(mut f: impl FnMut(In) -> Out + Send + 'static) -> Xform<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    Box::new(move |rf| {
        Box::new(MapStep {
            f,
            rf,
            _marker: std::marker::PhantomData,
        }) as BoxStep<In>
    })
}

struct MapIndexedStep<In, Out, F> {
    f: F,
    idx: usize,
    rf: BoxStep<Out>,
    _marker: std::marker::PhantomData<fn(In)>,
}

impl<In, Out, F> Step<In> for MapIndexedStep<In, Out, F>
where
    In: Send,
    Out: Send,
    F: FnMut(usize, In) -> Out + Send,
{
    fn step(&mut self, val: In) -> bool {
        let out = (self.f)(self.idx, val);
        self.idx += 1;
        self.rf.step(out)
    }

    fn complete(&mut self) {
        self.rf.complete();
    }
}

pub fn map_indexed<In, Out>(f: impl FnMut(usize, In) -> Out + Send + 'static) -> Xform<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    Box::new(move |rf| {
        Box::new(MapIndexedStep {
            f,
            idx: 0,
            rf,
            _marker: std::marker::PhantomData,
        }) as BoxStep<In>
    })
}

struct FilterStep<T, P> {
    pred: P,
    rf: BoxStep<T>,
}

impl<T, P> Step<T> for FilterStep<T, P>
where
    T: Send,
    P: FnMut(&T) -> bool + Send,
{
    fn step(&mut self, val: T) -> bool {
        if (self.pred)(&val) {
            self.rf.step(val)
        } else {
            false
        }
    }

    fn complete(&mut self) {
        self.rf.complete();
    }
}

pub fn filter<T: Send + 'static>(pred: impl FnMut(&T) -> bool + Send + 'static) -> Xform<T, T> {
    Box::new(move |rf| Box::new(FilterStep { pred, rf }) as BoxStep<T>)
}

pub fn remove<T: Send + 'static>(mut pred: impl FnMut(&T) -> bool + Send + 'static) -> Xform<T, T> {
    filter(move |v| !pred(v))
}

struct FilterIndexedStep<T, P> {
    pred: P,
    idx: usize,
    rf: BoxStep<T>,
}

impl<T, P> Step<T> for FilterIndexedStep<T, P>
where
    T: Send,
    P: FnMut(usize, &T) -> bool + Send,
{
    fn step(&mut self, val: T) -> bool {
        let keep = (self.pred)(self.idx, &val);
        self.idx += 1;
        if keep {
            self.rf.step(val)
        } else {
            false
        }
    }

    fn complete(&mut self) {
        self.rf.complete();
    }
}

pub fn filter_indexed<T: Send + 'static>(
    pred: impl FnMut(usize, &T) -> bool + Send + 'static,
) -> Xform<T, T> {
    Box::new(move |rf| Box::new(FilterIndexedStep { pred, idx: 0, rf }) as BoxStep<T>)
}

pub fn remove_indexed<T: Send + 'static>(
    mut pred: impl FnMut(usize, &T) -> bool + Send + 'static,
) -> Xform<T, T> {
    filter_indexed(move |i, v| !pred(i, v))
}

struct KeepStep<In, Out, F> {
    f: F,
    rf: BoxStep<Out>,
    _marker: std::marker::PhantomData<fn(In)>,
}

impl<In, Out, F> Step<In> for KeepStep<In, Out, F>
where
    In: Send,
    Out: Send,
    F: FnMut(In) -> Option<Out> + Send,
{
    fn step(&mut self, val: In) -> bool {
        match (self.f)(val) {
            Some(out) => self.rf.step(out),
            None => false,
        }
    }

    fn complete(&mut self) {
        self.rf.complete();
    }
}

pub fn keep<In, Out>(f: impl FnMut(In) -> Option<Out> + Send + 'static) -> Xform<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    Box::new(move |rf| {
        Box::new(KeepStep {
            f,
            rf,
            _marker: std::marker::PhantomData,
        }) as BoxStep<In>
    })
}

struct KeepIndexedStep<In, Out, F> {
    f: F,
    idx: usize,
    rf: BoxStep<Out>,
    _marker: std::marker::PhantomData<fn(In)>,
}

impl<In, Out, F> Step<In> for KeepIndexedStep<In, Out, F>
where
    In: Send,
    Out: Send,
    F: FnMut(usize, In) -> Option<Out> + Send,
{
    fn step(&mut self, val: In) -> bool {
        let r = (self.f)(self.idx, val);
        self.idx += 1;
        match r {
            Some(out) => self.rf.step(out),
            None => false,
        }
    }

    fn complete(&mut self) {
        self.rf.complete();
    }
}

pub fn keep_indexed<In, Out>(
    f: impl FnMut(usize, In) -> Option<Out> + Send + 'static,
) -> Xform<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    Box::new(move |rf| {
        Box::new(KeepIndexedStep {
            f,
            idx: 0,
            rf,
            _marker: std::marker::PhantomData,
        }) as BoxStep<In>
    })
}

pub fn replace<T>(table: std::collections::HashMap<T, T>) -> Xform<T, T>
where
    T: Eq + Hash + Clone + Send + 'static,
{
    map(move |v: T| table.get(&v).cloned().unwrap_or(v))
}

pub fn random_sample<T: Send + 'static>(prob: f64) -> Xform<T, T> {
    filter(move |_| rand::random::<f64>() < prob)
}

// -- sequence structure -------------------------------------------------------

struct CatStep<T> {
    rf: BoxStep<T>,
}

impl<T: Send> Step<Vec<T>> for CatStep<T> {
    fn step(&mut self, vals: Vec<T>) -> bool {
        for v in vals {
            if self.rf.step(v) {
                return true;
            }
        }
        false
    }

    fn complete(&mut self) {
        self.rf.complete();
    }
}

pub fn cat<T: Send + 'static>() -> Xform<Vec<T>, T> {
    Box::new(|rf| Box::new(CatStep { rf }) as BoxStep<Vec<T>>)
}

pub fn mapcat<In, Out>(f: impl FnMut(In) -> Vec<Out> + Send + 'static) -> Xform<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    comp(map(f), cat())
}

// -- length-limited -----------------------------------------------------------

struct TakeStep<T> {
    remaining: usize,
    rf: BoxStep<T>,
}

impl<T: Send> Step<T> for TakeStep<T> {
    fn step(&mut self, val: T) -> bool {
        if self.remaining == 0 {
            return true;
        }
        self.remaining -= 1;
        let stop_after = self.remaining == 0;
        let reduced = self.rf.step(val);
        reduced || stop_after
    }

    fn complete(&mut self) {
        self.rf.complete();
    }
}

pub fn take<T: Send + 'static>(n: usize) -> Xform<T, T> {
    Box::new(move |rf| Box::new(TakeStep { remaining: n, rf }) as BoxStep<T>)
}

struct TakeLastStep<T> {
    n: usize,
    window: VecDeque<T>,
    rf: BoxStep<T>,
}

impl<T: Send> Step<T> for TakeLastStep<T> {
    fn step(&mut self, val: T) -> bool {
        if self.n > 0 {
            if self.window.len() == self.n {
                self.window.pop_front();
            }
            self.window.push_back(val);
        }
        false
    }

    fn complete(&mut self) {
        while let Some(v) = self.window.pop_front() {
            if self.rf.step(v) {
                break;
            }
        }
        self.rf.complete();
    }
}

pub fn take_last<T: Send + 'static>(n: usize) -> Xform<T, T> {
    Box::new(move |rf| {
        Box::new(TakeLastStep {
            n,
            window: VecDeque::new(),
            rf,
        }) as BoxStep<T>
    })
}

pub fn take_nth<T: Send + 'static>(n: usize) -> Xform<T, T> {
    assert!(n > 0, "take_nth requires n >= 1");
    filter_indexed(move |i, _| i % n == 0)
}

struct TakeWhileStep<T, P> {
    pred: P,
    rf: BoxStep<T>,
}

impl<T, P> Step<T> for TakeWhileStep<T, P>
where
    T: Send,
    P: FnMut(&T) -> bool + Send,
{
    fn step(&mut self, val: T) -> bool {
        if (self.pred)(&val) {
            self.rf.step(val)
        } else {
            true
        }
    }

    fn complete(&mut self) {
        self.rf.complete();
    }
}

pub fn take_while<T: Send + 'static>(pred: impl FnMut(&T) -> bool + Send + 'static) -> Xform<T, T> {
    Box::new(move |rf| Box::new(TakeWhileStep { pred, rf }) as BoxStep<T>)
}

struct DropStep<T> {
    remaining: usize,
    rf: BoxStep<T>,
}

impl<T: Send> Step<T> for DropStep<T> {
    fn step(&mut self, val: T) -> bool {
        if self.remaining > 0 {
            self.remaining -= 1;
            false
        } else {
            self.rf.step(val)
        }
    }

    fn complete(&mut self) {
        self.rf.complete();
    }
}

pub fn drop<T: Send + 'static>(n: usize) -> Xform<T, T> {
    Box::new(move |rf| Box::new(DropStep { remaining: n, rf }) as BoxStep<T>)
}

struct DropLastStep<T> {
    n: usize,
    window: VecDeque<T>,
    rf: BoxStep<T>,
}

impl<T: Send> Step<T> for DropLastStep<T> {
    fn step(&mut self, val: T) -> bool {
        self.window.push_back(val);
        if self.window.len() > self.n {
            let ready = self.window.pop_front().unwrap();
            self.rf.step(ready)
        } else {
            false
        }
    }

    fn complete(&mut self) {
        self.rf.complete();
    }
}

pub fn drop_last<T: Send + 'static>(n: usize) -> Xform<T, T> {
    Box::new(move |rf| {
        Box::new(DropLastStep {
            n,
            window: VecDeque::new(),
            rf,
        }) as BoxStep<T>
    })
}

struct DropWhileStep<T, P> {
    pred: P,
    dropping: bool,
    rf: BoxStep<T>,
}

impl<T, P> Step<T> for DropWhileStep<T, P>
where
    T: Send,
    P: FnMut(&T) -> bool + Send,
{
    fn step(&mut self, val: T) -> bool {
        if self.dropping {
            if (self.pred)(&val) {
                return false;
            }
            self.dropping = false;
        }
        self.rf.step(val)
    }

    fn complete(&mut self) {
        self.rf.complete();
    }
}

pub fn drop_while<T: Send + 'static>(pred: impl FnMut(&T) -> bool + Send + 'static) -> Xform<T, T> {
    Box::new(move |rf| {
        Box::new(DropWhileStep {
            pred,
            dropping: true,
            rf,
        }) as BoxStep<T>
    })
}

// -- stateful ------------------------------------------------------------------

struct DistinctStep<T> {
    seen: HashSet<T>,
    rf: BoxStep<T>,
}

impl<T: Send + Eq + Hash + Clone> Step<T> for DistinctStep<T> {
    fn step(&mut self, val: T) -> bool {
        if self.seen.insert(val.clone()) {
            self.rf.step(val)
        } else {
            false
        }
    }

    fn complete(&mut self) {
        self.rf.complete();
    }
}

pub fn distinct<T: Send + Eq + Hash + Clone + 'static>() -> Xform<T, T> {
    Box::new(move |rf| {
        Box::new(DistinctStep {
            seen: HashSet::new(),
            rf,
        }) as BoxStep<T>
    })
}

struct DedupeStep<T> {
    last: Option<T>,
    rf: BoxStep<T>,
}

impl<T: Send + PartialEq + Clone> Step<T> for DedupeStep<T> {
    fn step(&mut self, val: T) -> bool {
        if self.last.as_ref() == Some(&val) {
            return false;
        }
        self.last = Some(val.clone());
        self.rf.step(val)
    }

    fn complete(&mut self) {
        self.rf.complete();
    }
}

pub fn dedupe<T: Send + PartialEq + Clone + 'static>() -> Xform<T, T> {
    Box::new(move |rf| Box::new(DedupeStep { last: None, rf }) as BoxStep<T>)
}

struct PartitionAllStep<T> {
    n: usize,
    step_size: usize,
    skip: usize,
    pending: Vec<T>,
    rf: BoxStep<Vec<T>>,
}

impl<T: Send + Clone> Step<T> for PartitionAllStep<T> {
    fn step(&mut self, val: T) -> bool {
        if self.skip > 0 {
            self.skip -= 1;
            return false;
        }
        self.pending.push(val);
        if self.pending.len() == self.n {
            let full = std::mem::take(&mut self.pending);
            if self.step_size < self.n {
                self.pending = full[self.step_size..].to_vec();
            } else if self.step_size > self.n {
                self.skip = self.step_size - self.n;
            }
            self.rf.step(full)
        } else {
            false
        }
    }

    fn complete(&mut self) {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.rf.step(rest);
        }
        self.rf.complete();
    }
}

pub fn partition_all<T: Send + Clone + 'static>(n: usize, step_size: Option<usize>) -> Xform<T, Vec<T>> {
    assert!(n > 0, "partition_all requires n >= 1");
    let step_size = step_size.unwrap_or(n);
    Box::new(move |rf| {
        Box::new(PartitionAllStep {
            n,
            step_size,
            skip: 0,
            pending: Vec::with_capacity(n),
            rf,
        }) as BoxStep<T>
    })
}

struct PartitionStep<T> {
    n: usize,
    step_size: usize,
    skip: usize,
    pad: Option<Vec<T>>,
    pending: Vec<T>,
    rf: BoxStep<Vec<T>>,
}

impl<T: Send + Clone> Step<T> for PartitionStep<T> {
    fn step(&mut self, val: T) -> bool {
        if self.skip > 0 {
            self.skip -= 1;
            return false;
        }
        self.pending.push(val);
        if self.pending.len() == self.n {
            let full = std::mem::take(&mut self.pending);
            if self.step_size < self.n {
                self.pending = full[self.step_size..].to_vec();
            } else if self.step_size > self.n {
                self.skip = self.step_size - self.n;
            }
            self.rf.step(full)
        } else {
            false
        }
    }

    fn complete(&mut self) {
        if !self.pending.is_empty() {
            if let Some(mut pad) = self.pad.take() {
                let needed = self.n - self.pending.len();
                let mut group = std::mem::take(&mut self.pending);
                group.extend(pad.drain(..pad.len().min(needed)));
                self.rf.step(group);
            }
            // Without a pad, a short trailing group is dropped, matching
            // the reference `partition` (unlike `partition_all`).
        }
        self.rf.complete();
    }
}

pub fn partition<T: Send + Clone + 'static>(
    n: usize,
    step_size: Option<usize>,
    pad: Option<Vec<T>>,
) -> Xform<T, Vec<T>> {
    assert!(n > 0, "partition requires n >= 1");
    let step_size = step_size.unwrap_or(n);
    Box::new(move |rf| {
        Box::new(PartitionStep {
            n,
            step_size,
            skip: 0,
            pad,
            pending: Vec::with_capacity(n),
            rf,
        }) as BoxStep<T>
    })
}

struct PartitionByStep<T, K, F> {
    f: F,
    last_key: Option<K>,
    pending: Vec<T>,
    rf: BoxStep<Vec<T>>,
}

impl<T, K, F> Step<T> for PartitionByStep<T, K, F>
where
    T: Send,
    K: PartialEq + Send,
    F: FnMut(&T) -> K + Send,
{
    fn step(&mut self, val: T) -> bool {
        let key = (self.f)(&val);
        let same_group = self.last_key.as_ref() == Some(&key);
        self.last_key = Some(key);
        if !same_group && !self.pending.is_empty() {
            let group = std::mem::take(&mut self.pending);
            self.pending.push(val);
            return self.rf.step(group);
        }
        self.pending.push(val);
        false
    }

    fn complete(&mut self) {
        if !self.pending.is_empty() {
            let group = std::mem::take(&mut self.pending);
            self.rf.step(group);
        }
        self.rf.complete();
    }
}

pub fn partition_by<T, K>(f: impl FnMut(&T) -> K + Send + 'static) -> Xform<T, Vec<T>>
where
    T: Send + 'static,
    K: PartialEq + Send + 'static,
{
    Box::new(move |rf| {
        Box::new(PartitionByStep {
            f,
            last_key: None,
            pending: Vec::new(),
            rf,
        }) as BoxStep<T>
    })
}

struct ReductionsStep<In, Acc, F> {
    f: F,
    acc: Option<Acc>,
    init: Acc,
    rf: BoxStep<Acc>,
    _marker: std::marker::PhantomData<fn(In)>,
}

impl<In, Acc, F> Step<In> for ReductionsStep<In, Acc, F>
where
    In: Send,
    Acc: Clone + Send,
    F: FnMut(Acc, In) -> Acc + Send,
{
    fn step(&mut self, val: In) -> bool {
        let first = self.acc.is_none();
        let prev = self.acc.take().unwrap_or_else(|| self.init.clone());
        let next = (self.f)(prev, val);
        self.acc = Some(next.clone());
        if first && self.rf.step(self.init.clone()) {
            return true;
        }
        self.rf.step(next)
    }

    fn complete(&mut self) {
        if self.acc.is_none() {
            self.rf.step(self.init.clone());
        }
        self.rf.complete();
    }
}

pub fn reductions<In, Acc>(
    f: impl FnMut(Acc, In) -> Acc + Send + 'static,
    init: Acc,
) -> Xform<In, Acc>
where
    In: Send + 'static,
    Acc: Clone + Send + 'static,
{
    Box::new(move |rf| {
        Box::new(ReductionsStep {
            f,
            acc: None,
            init,
            rf,
            _marker: std::marker::PhantomData,
        }) as BoxStep<In>
    })
}

struct InterposeStep<T> {
    sep: T,
    started: bool,
    rf: BoxStep<T>,
}

impl<T: Send + Clone> Step<T> for InterposeStep<T> {
    fn step(&mut self, val: T) -> bool {
        if self.started {
            if self.rf.step(self.sep.clone()) {
                return true;
            }
        }
        self.started = true;
        self.rf.step(val)
    }

    fn complete(&mut self) {
        self.rf.complete();
    }
}

pub fn interpose<T: Send + Clone + 'static>(sep: T) -> Xform<T, T> {
    Box::new(move |rf| {
        Box::new(InterposeStep {
            sep,
            started: false,
            rf,
        }) as BoxStep<T>
    })
}
