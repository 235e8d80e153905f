//! Expression Operands
//!
//! Arithmetic between two handles builds a [`Calc`] evaluating the same
//! expression over their current values:
//!
//! ```
//! use reaction_core::prelude::*;
//!
//! let buy = var(100);
//! let current = var(105);
//! let profit = current - buy;
//! assert_eq!(profit.get(), 5);
//!
//! current.set(110);
//! assert_eq!(profit.get(), 10);
//! ```

use std::ops::{Add, Div, Mul, Sub};

use super::calc::Calc;
use super::field::Field;
use super::handle::Reactive;
use super::var::Var;

macro_rules! impl_binary_op {
    ($op:ident, $method:ident, $lhs:ident, $rhs:ident) => {
        impl<L, R> $op<$rhs<R>> for $lhs<L>
        where
            L: Clone + PartialEq + 'static + $op<R>,
            R: Clone + PartialEq + 'static,
            <L as $op<R>>::Output: Clone + PartialEq + 'static,
        {
            type Output = Calc<<L as $op<R>>::Output>;

            fn $method(self, rhs: $rhs<R>) -> Self::Output {
                Calc::new(move || $op::$method(self.get(), rhs.get()))
            }
        }
    };
}

macro_rules! impl_operands {
    ($($op:ident :: $method:ident),*) => {
        $(
            impl_binary_op!($op, $method, Var, Var);
            impl_binary_op!($op, $method, Var, Calc);
            impl_binary_op!($op, $method, Var, Field);
            impl_binary_op!($op, $method, Calc, Var);
            impl_binary_op!($op, $method, Calc, Calc);
            impl_binary_op!($op, $method, Calc, Field);
            impl_binary_op!($op, $method, Field, Var);
            impl_binary_op!($op, $method, Field, Calc);
            impl_binary_op!($op, $method, Field, Field);
        )*
    };
}

impl_operands!(Add::add, Sub::sub, Mul::mul, Div::div);
