//! Native function storage and dispatch.
//!
//! Every native callable exposed to the host ends up in one of two shapes:
//!
//! - a [`RawFn`]: a plain function pointer whose parameters and return are
//!   all [`HostValue`], which the host calls directly with no conversion
//! - an entry in the [`FunctionTable`]: the callable is erased behind
//!   `Box<dyn Any>` and a monomorphized [`Dispatcher`] for its signature
//!   downcasts it, unboxes the arguments, calls it and boxes the result
//!
//! The table is append-only, so a [`FunctionIndex`] handed to the host stays
//! valid for the lifetime of the table.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use tracing::trace;

use crate::convert::{FromHost, HostType, IntoHost};
use crate::error::{NativeError, TypeError};
use crate::{HostValue, TypeTag};

/// Stable position of a callable in the [`FunctionTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionIndex(usize);

impl FunctionIndex {
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for FunctionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Values returned to the host by one call.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Values {
    /// No values, the result of a native function returning `()`.
    #[default]
    Zero,
    One(HostValue),
}

impl Values {
    pub fn len(&self) -> usize {
        match self {
            Values::Zero => 0,
            Values::One(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Values::Zero)
    }

    pub fn first(&self) -> Option<&HostValue> {
        match self {
            Values::Zero => None,
            Values::One(v) => Some(v),
        }
    }

    /// Primary value as the host sees it: `Nil` when there are none.
    pub fn into_primary(self) -> HostValue {
        match self {
            Values::Zero => HostValue::Nil,
            Values::One(v) => v,
        }
    }
}

// ============================================================================
// Return adaptation
// ============================================================================

/// Converts what a native function returns into host values.
///
/// `()` produces no values at all rather than a boxed unit. `Result<T, E>`
/// turns `Err` into a [`NativeError::Failed`] carrying the error message.
pub trait ReturnAdapter {
    const IS_MAPPED: bool;

    /// Host tag of the return value, `None` when nothing is returned.
    fn return_type() -> Result<Option<TypeTag>, TypeError>;

    fn into_values(self) -> Result<Values, NativeError>;
}

impl ReturnAdapter for () {
    const IS_MAPPED: bool = false;

    fn return_type() -> Result<Option<TypeTag>, TypeError> {
        Ok(None)
    }

    #[inline]
    fn into_values(self) -> Result<Values, NativeError> {
        Ok(Values::Zero)
    }
}

impl<T: IntoHost> ReturnAdapter for T {
    const IS_MAPPED: bool = <T as HostType>::IS_MAPPED;

    fn return_type() -> Result<Option<TypeTag>, TypeError> {
        T::lisp_type().map(Some)
    }

    #[inline]
    fn into_values(self) -> Result<Values, NativeError> {
        self.into_host().map(Values::One).map_err(NativeError::Return)
    }
}

impl<T: ReturnAdapter, E: fmt::Display> ReturnAdapter for Result<T, E> {
    const IS_MAPPED: bool = false;

    fn return_type() -> Result<Option<TypeTag>, TypeError> {
        T::return_type()
    }

    fn into_values(self) -> Result<Values, NativeError> {
        match self {
            Ok(value) => value.into_values(),
            Err(err) => Err(NativeError::failed(err.to_string())),
        }
    }
}

// ============================================================================
// Function table
// ============================================================================

/// Per-signature entry point: looks up the callable at `index` and runs it.
pub type Dispatcher = fn(&FunctionTable, FunctionIndex, &[HostValue]) -> Result<Values, NativeError>;

struct TableEntry {
    callable: Box<dyn Any>,
    dispatcher: Dispatcher,
    arity: usize,
}

/// Append-only table of type-erased native callables.
#[derive(Default)]
pub struct FunctionTable {
    entries: Vec<TableEntry>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an erased callable. Indices are issued in order from zero.
    pub fn push(&mut self, callable: Box<dyn Any>, dispatcher: Dispatcher, arity: usize) -> FunctionIndex {
        let index = FunctionIndex(self.entries.len());
        self.entries.push(TableEntry { callable, dispatcher, arity });
        index
    }

    /// Erases `f` and appends it.
    pub fn insert<F, Args, R>(&mut self, f: F) -> FunctionIndex
    where
        F: IntoNativeFn<Args, R>,
    {
        self.push(f.into_callable(), F::dispatcher(), F::ARITY)
    }

    pub fn callable(&self, index: FunctionIndex) -> Option<&dyn Any> {
        self.entries.get(index.0).map(|entry| entry.callable.as_ref())
    }

    pub fn arity(&self, index: FunctionIndex) -> Option<usize> {
        self.entries.get(index.0).map(|entry| entry.arity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs the callable at `index` with its own dispatcher.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn dispatch(&self, index: FunctionIndex, args: &[HostValue]) -> Result<Values, NativeError> {
        let entry = self
            .entries
            .get(index.0)
            .ok_or(NativeError::StaleFunction { index: index.0 })?;
        trace!(%index, args = args.len(), "dispatch");
        (entry.dispatcher)(self, index, args)
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTable").field("len", &self.entries.len()).finish_non_exhaustive()
    }
}

// ============================================================================
// Erasure of native callables
// ============================================================================

/// A native callable with a host-callable signature.
///
/// Implemented for every `Fn(A1, .., An) -> R` up to eight arguments where
/// each argument is [`FromHost`] and `R` is a [`ReturnAdapter`].
pub trait IntoNativeFn<Args, R>: 'static {
    /// False only when every argument and the return are already host values.
    const NEEDS_CONVERSION: bool;

    const ARITY: usize;

    fn argument_types() -> Result<Vec<TypeTag>, TypeError>;

    fn return_type() -> Result<Option<TypeTag>, TypeError>;

    /// The callable erased as `Rc<dyn Fn(A1, .., An) -> R>` inside `Box<dyn Any>`.
    fn into_callable(self) -> Box<dyn Any>;

    /// Dispatcher that downcasts what [`into_callable`](Self::into_callable) produced.
    fn dispatcher() -> Dispatcher;
}

macro_rules! impl_into_native_fn {
    ($count:expr; $($arg:ident),*) => {
        impl<F, R, $($arg,)*> IntoNativeFn<($($arg,)*), R> for F
        where
            F: Fn($($arg),*) -> R + 'static,
            R: ReturnAdapter + 'static,
            $($arg: FromHost + 'static,)*
        {
            const NEEDS_CONVERSION: bool = !(R::IS_MAPPED $(&& <$arg as HostType>::IS_MAPPED)*);

            const ARITY: usize = $count;

            fn argument_types() -> Result<Vec<TypeTag>, TypeError> {
                Ok(vec![$(<$arg as HostType>::lisp_type()?),*])
            }

            fn return_type() -> Result<Option<TypeTag>, TypeError> {
                R::return_type()
            }

            fn into_callable(self) -> Box<dyn Any> {
                let callable: Rc<dyn Fn($($arg),*) -> R> = Rc::new(self);
                Box::new(callable)
            }

            fn dispatcher() -> Dispatcher {
                #[allow(non_snake_case, unused_assignments, unused_mut, unused_variables)]
                fn dispatch<R: ReturnAdapter + 'static, $($arg: FromHost + 'static,)*>(
                    table: &FunctionTable,
                    index: FunctionIndex,
                    args: &[HostValue],
                ) -> Result<Values, NativeError> {
                    let callable = table
                        .callable(index)
                        .and_then(|c| c.downcast_ref::<Rc<dyn Fn($($arg),*) -> R>>())
                        .ok_or(NativeError::StaleFunction { index: index.as_usize() })?;
                    let [$($arg),*] = args else {
                        return Err(NativeError::ArityMismatch { expected: $count, got: args.len() });
                    };
                    catch_unwind(AssertUnwindSafe(|| {
                        let mut position = 0usize;
                        $(
                            let $arg = <$arg as FromHost>::from_host($arg)
                                .map_err(|source| NativeError::Argument { position, source })?;
                            position += 1;
                        )*
                        (**callable)($($arg),*).into_values()
                    }))
                    .unwrap_or_else(|payload| Err(NativeError::from_panic(payload)))
                }
                dispatch::<R, $($arg,)*>
            }
        }
    };
}

impl_into_native_fn!(0;);
impl_into_native_fn!(1; A1);
impl_into_native_fn!(2; A1, A2);
impl_into_native_fn!(3; A1, A2, A3);
impl_into_native_fn!(4; A1, A2, A3, A4);
impl_into_native_fn!(5; A1, A2, A3, A4, A5);
impl_into_native_fn!(6; A1, A2, A3, A4, A5, A6);
impl_into_native_fn!(7; A1, A2, A3, A4, A5, A6, A7);
impl_into_native_fn!(8; A1, A2, A3, A4, A5, A6, A7, A8);

// ============================================================================
// Direct calls
// ============================================================================

/// A function pointer over host values, callable with no conversion.
#[derive(Clone, Copy)]
pub enum RawFn {
    Arity0(fn() -> HostValue),
    Arity1(fn(HostValue) -> HostValue),
    Arity2(fn(HostValue, HostValue) -> HostValue),
    Arity3(fn(HostValue, HostValue, HostValue) -> HostValue),
    Arity4(fn(HostValue, HostValue, HostValue, HostValue) -> HostValue),
    Arity5(fn(HostValue, HostValue, HostValue, HostValue, HostValue) -> HostValue),
    Arity6(fn(HostValue, HostValue, HostValue, HostValue, HostValue, HostValue) -> HostValue),
    Arity7(fn(HostValue, HostValue, HostValue, HostValue, HostValue, HostValue, HostValue) -> HostValue),
    Arity8(fn(HostValue, HostValue, HostValue, HostValue, HostValue, HostValue, HostValue, HostValue) -> HostValue),
}

impl RawFn {
    pub fn arity(self) -> usize {
        match self {
            RawFn::Arity0(_) => 0,
            RawFn::Arity1(_) => 1,
            RawFn::Arity2(_) => 2,
            RawFn::Arity3(_) => 3,
            RawFn::Arity4(_) => 4,
            RawFn::Arity5(_) => 5,
            RawFn::Arity6(_) => 6,
            RawFn::Arity7(_) => 7,
            RawFn::Arity8(_) => 8,
        }
    }

    /// Calls the pointer with the host arguments as they are.
    pub fn call(self, args: &[HostValue]) -> Result<HostValue, NativeError> {
        catch_unwind(AssertUnwindSafe(|| match (self, args) {
            (RawFn::Arity0(f), []) => Ok(f()),
            (RawFn::Arity1(f), [a]) => Ok(f(a.clone())),
            (RawFn::Arity2(f), [a, b]) => Ok(f(a.clone(), b.clone())),
            (RawFn::Arity3(f), [a, b, c]) => Ok(f(a.clone(), b.clone(), c.clone())),
            (RawFn::Arity4(f), [a, b, c, d]) => Ok(f(a.clone(), b.clone(), c.clone(), d.clone())),
            (RawFn::Arity5(f), [a, b, c, d, e]) => Ok(f(a.clone(), b.clone(), c.clone(), d.clone(), e.clone())),
            (RawFn::Arity6(f), [a, b, c, d, e, g]) => {
                Ok(f(a.clone(), b.clone(), c.clone(), d.clone(), e.clone(), g.clone()))
            }
            (RawFn::Arity7(f), [a, b, c, d, e, g, h]) => {
                Ok(f(a.clone(), b.clone(), c.clone(), d.clone(), e.clone(), g.clone(), h.clone()))
            }
            (RawFn::Arity8(f), [a, b, c, d, e, g, h, i]) => {
                Ok(f(a.clone(), b.clone(), c.clone(), d.clone(), e.clone(), g.clone(), h.clone(), i.clone()))
            }
            _ => Err(NativeError::ArityMismatch { expected: self.arity(), got: args.len() }),
        }))
        .unwrap_or_else(|payload| Err(NativeError::from_panic(payload)))
    }
}

impl fmt::Debug for RawFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawFn(arity {})", self.arity())
    }
}

macro_rules! host_value {
    ($_arg:ident) => {
        HostValue
    };
}

/// A plain function pointer that may qualify for a direct call.
pub trait NativeFnPtr: Copy + 'static {
    type Args;
    type Ret;

    /// The pointer as a [`RawFn`], if its whole signature is host values.
    fn raw(self) -> Option<RawFn>;
}

macro_rules! impl_native_fn_ptr {
    ($variant:ident; $($arg:ident),*) => {
        impl<R: 'static, $($arg: 'static,)*> NativeFnPtr for fn($($arg),*) -> R {
            type Args = ($($arg,)*);
            type Ret = R;

            fn raw(self) -> Option<RawFn> {
                let any: &dyn Any = &self;
                any.downcast_ref::<fn($(host_value!($arg)),*) -> HostValue>()
                    .copied()
                    .map(RawFn::$variant)
            }
        }
    };
}

impl_native_fn_ptr!(Arity0;);
impl_native_fn_ptr!(Arity1; A1);
impl_native_fn_ptr!(Arity2; A1, A2);
impl_native_fn_ptr!(Arity3; A1, A2, A3);
impl_native_fn_ptr!(Arity4; A1, A2, A3, A4);
impl_native_fn_ptr!(Arity5; A1, A2, A3, A4, A5);
impl_native_fn_ptr!(Arity6; A1, A2, A3, A4, A5, A6);
impl_native_fn_ptr!(Arity7; A1, A2, A3, A4, A5, A6, A7);
impl_native_fn_ptr!(Arity8; A1, A2, A3, A4, A5, A6, A7, A8);

// ============================================================================
// Host function entries
// ============================================================================

/// What the host stores for a function symbol.
#[derive(Clone, Copy)]
pub enum HostFunction {
    /// Called directly with the host arguments.
    Direct(RawFn),
    /// Called through the table entry at `index`.
    Dispatch { index: FunctionIndex, dispatcher: Dispatcher, arity: usize },
}

impl HostFunction {
    pub fn arity(&self) -> usize {
        match self {
            HostFunction::Direct(raw) => raw.arity(),
            HostFunction::Dispatch { arity, .. } => *arity,
        }
    }

    pub fn index(&self) -> Option<FunctionIndex> {
        match self {
            HostFunction::Direct(_) => None,
            HostFunction::Dispatch { index, .. } => Some(*index),
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, HostFunction::Direct(_))
    }

    pub fn invoke(&self, table: &FunctionTable, args: &[HostValue]) -> Result<Values, NativeError> {
        match self {
            HostFunction::Direct(raw) => raw.call(args).map(Values::One),
            HostFunction::Dispatch { index, dispatcher, .. } => dispatcher(table, *index, args),
        }
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostFunction::Direct(raw) => f.debug_tuple("Direct").field(raw).finish(),
            HostFunction::Dispatch { index, arity, .. } => f
                .debug_struct("Dispatch")
                .field("index", index)
                .field("arity", arity)
                .finish_non_exhaustive(),
        }
    }
}

// ============================================================================
// Outbound arguments
// ============================================================================

/// Native arguments boxed for a call into a host function.
pub trait IntoArgs {
    fn into_args(self) -> Result<Vec<HostValue>, NativeError>;
}

impl IntoArgs for Vec<HostValue> {
    fn into_args(self) -> Result<Vec<HostValue>, NativeError> {
        Ok(self)
    }
}

macro_rules! impl_into_args {
    ($($arg:ident => $idx:tt),*) => {
        impl<$($arg: IntoHost,)*> IntoArgs for ($($arg,)*) {
            #[allow(unused_variables)]
            fn into_args(self) -> Result<Vec<HostValue>, NativeError> {
                Ok(vec![$(
                    self.$idx
                        .into_host()
                        .map_err(|source| NativeError::UnsupportedArgumentType { position: $idx, source })?
                ),*])
            }
        }
    };
}

impl_into_args!();
impl_into_args!(A1 => 0);
impl_into_args!(A1 => 0, A2 => 1);
impl_into_args!(A1 => 0, A2 => 1, A3 => 2);
impl_into_args!(A1 => 0, A2 => 1, A3 => 2, A4 => 3);
impl_into_args!(A1 => 0, A2 => 1, A3 => 2, A4 => 3, A5 => 4);
impl_into_args!(A1 => 0, A2 => 1, A3 => 2, A4 => 3, A5 => 4, A6 => 5);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConversionError;

    fn add(a: i32, b: i32) -> i32 {
        a + b
    }

    fn host_identity(v: HostValue) -> HostValue {
        v
    }

    #[test]
    fn indices_are_issued_in_order_and_never_move() {
        let mut table = FunctionTable::new();
        let first: Vec<_> = (0..3).map(|_| table.insert(add)).collect();
        let second: Vec<_> = (0..2).map(|_| table.insert(|| ())).collect();
        assert_eq!(first.iter().map(|i| i.as_usize()).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(second.iter().map(|i| i.as_usize()).collect::<Vec<_>>(), vec![3, 4]);
        let sum = table.dispatch(first[1], &[HostValue::int32(2), HostValue::int32(3)]);
        assert_eq!(sum, Ok(Values::One(HostValue::int32(5))));
        assert_eq!(table.arity(second[0]), Some(0));
    }

    #[test]
    fn unit_return_yields_no_values() {
        let mut table = FunctionTable::new();
        let index = table.insert(|_: i32| ());
        let values = table.dispatch(index, &[HostValue::int32(1)]).unwrap();
        assert!(values.is_empty());
        assert_eq!(values.into_primary(), HostValue::Nil);
    }

    #[test]
    fn argument_conversion_errors_report_position() {
        let mut table = FunctionTable::new();
        let index = table.insert(add);
        let err = table.dispatch(index, &[HostValue::int32(1), HostValue::string("x")]).unwrap_err();
        assert_eq!(
            err,
            NativeError::Argument { position: 1, source: ConversionError::mismatch(TypeTag::INT32, "STRING") }
        );
    }

    #[test]
    fn arity_mismatch() {
        let mut table = FunctionTable::new();
        let index = table.insert(add);
        assert_eq!(
            table.dispatch(index, &[HostValue::int32(1)]),
            Err(NativeError::ArityMismatch { expected: 2, got: 1 })
        );
    }

    #[test]
    fn result_errors_become_failures() {
        let mut table = FunctionTable::new();
        let index = table.insert(|v: i32| if v < 0 { Err("negative") } else { Ok(v * 2) });
        assert_eq!(table.dispatch(index, &[HostValue::int32(4)]), Ok(Values::One(HostValue::int32(8))));
        assert_eq!(table.dispatch(index, &[HostValue::int32(-4)]), Err(NativeError::failed("negative")));
    }

    #[test]
    fn panics_are_contained() {
        let mut table = FunctionTable::new();
        let boom = table.insert(|| -> i32 { panic!("boom") });
        let ok = table.insert(|| 1i32);
        assert_eq!(table.dispatch(boom, &[]), Err(NativeError::Panic { message: "boom".into() }));
        assert_eq!(table.dispatch(ok, &[]), Ok(Values::One(HostValue::int32(1))));
    }

    #[test]
    fn stale_index() {
        let table = FunctionTable::new();
        let mut other = FunctionTable::new();
        let index = other.insert(|| ());
        assert_eq!(table.dispatch(index, &[]), Err(NativeError::StaleFunction { index: 0 }));
    }

    #[test]
    fn signature_metadata() {
        type F = fn(i32, String) -> f64;
        assert_eq!(<F as IntoNativeFn<(i32, String), f64>>::ARITY, 2);
        assert_eq!(
            <F as IntoNativeFn<(i32, String), f64>>::argument_types(),
            Ok(vec![TypeTag::INT32, TypeTag::String])
        );
        assert_eq!(<F as IntoNativeFn<(i32, String), f64>>::return_type(), Ok(Some(TypeTag::DOUBLE_FLOAT)));
        assert!(<F as IntoNativeFn<(i32, String), f64>>::NEEDS_CONVERSION);

        type G = fn(HostValue) -> HostValue;
        assert!(!<G as IntoNativeFn<(HostValue,), HostValue>>::NEEDS_CONVERSION);

        type V = fn(HostValue);
        assert!(<V as IntoNativeFn<(HostValue,), ()>>::NEEDS_CONVERSION);
        assert_eq!(<V as IntoNativeFn<(HostValue,), ()>>::return_type(), Ok(None));
    }

    #[test]
    fn raw_pointers_only_for_host_value_signatures() {
        let direct: fn(HostValue) -> HostValue = host_identity;
        let raw = direct.raw().unwrap();
        assert_eq!(raw.arity(), 1);
        assert_eq!(raw.call(&[HostValue::int8(9)]), Ok(HostValue::int8(9)));
        assert_eq!(raw.call(&[]), Err(NativeError::ArityMismatch { expected: 1, got: 0 }));

        let converted: fn(i32, i32) -> i32 = add;
        assert!(converted.raw().is_none());
    }

    #[test]
    fn direct_and_dispatch_entries_agree() {
        let mut table = FunctionTable::new();
        let ptr: fn(HostValue) -> HostValue = host_identity;
        let index = table.insert(ptr);
        let dispatcher = <fn(HostValue) -> HostValue as IntoNativeFn<(HostValue,), HostValue>>::dispatcher();
        let via_table = HostFunction::Dispatch { index, dispatcher, arity: 1 };
        let direct = HostFunction::Direct(ptr.raw().unwrap());
        let args = [HostValue::string("same")];
        assert_eq!(via_table.invoke(&table, &args), direct.invoke(&table, &args));
        assert!(direct.is_direct());
        assert_eq!(via_table.index(), Some(index));
    }

    #[test]
    fn outbound_arguments_report_position() {
        struct Unregistered;
        crate::native_type!(Unregistered);
        let args = (1i32, "two").into_args().unwrap();
        assert_eq!(args, vec![HostValue::int32(1), HostValue::string("two")]);

        let err = (1i32, Unregistered).into_args().unwrap_err();
        assert!(matches!(err, NativeError::UnsupportedArgumentType { position: 1, .. }));
    }
}
