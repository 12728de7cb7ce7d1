//! Operator semantics over [`Value`].
//!
//! Every operator is strict in Null: a Null operand gives Null, `and`/`or`
//! and `==` included. Operations without a value (division by zero, integer
//! overflow, operands of the wrong runtime type) also give Null.

use std::cmp::Ordering;

use crate::model::Value;
use crate::recipe::{BinaryOp, UnaryOp};

pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    if left.is_null() || right.is_null() {
        return Value::Null;
    }
    match op {
        BinaryOp::Add => arithmetic(left, right, i64::checked_add, |a, b| a + b),
        BinaryOp::Sub => arithmetic(left, right, i64::checked_sub, |a, b| a - b),
        BinaryOp::Mul => arithmetic(left, right, i64::checked_mul, |a, b| a * b),
        BinaryOp::Mod => match (left, right) {
            (Value::Int(a), Value::Int(b)) => a.checked_rem(*b).map_or(Value::Null, Value::Int),
            _ => float_op(left, right, |a, b| if b == 0.0 { None } else { Some(a % b) }),
        },
        BinaryOp::Div => float_op(left, right, |a, b| if b == 0.0 { None } else { Some(a / b) }),
        BinaryOp::Eq => left.equals(right).map_or(Value::Null, Value::Bool),
        BinaryOp::Neq => left.equals(right).map_or(Value::Null, |b| Value::Bool(!b)),
        BinaryOp::Lt => compare(left, right, |o| o == Ordering::Less),
        BinaryOp::Lte => compare(left, right, |o| o != Ordering::Greater),
        BinaryOp::Gt => compare(left, right, |o| o == Ordering::Greater),
        BinaryOp::Gte => compare(left, right, |o| o != Ordering::Less),
        BinaryOp::And => logical(left, right, |a, b| a && b),
        BinaryOp::Or => logical(left, right, |a, b| a || b),
    }
}

pub fn unary(op: UnaryOp, operand: &Value) -> Value {
    match (op, operand) {
        (UnaryOp::Not, Value::Bool(b)) => Value::Bool(!b),
        (UnaryOp::Neg, Value::Int(i)) => i.checked_neg().map_or(Value::Null, Value::Int),
        (UnaryOp::Neg, Value::Float(f)) => Value::Float(-f),
        _ => Value::Null,
    }
}

fn arithmetic(
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> Value {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_op(*a, *b).map_or(Value::Null, Value::Int),
        _ => float_op(left, right, |a, b| Some(float(a, b))),
    }
}

fn float_op(left: &Value, right: &Value, f: impl Fn(f64, f64) -> Option<f64>) -> Value {
    match (left.as_float(), right.as_float()) {
        (Some(a), Some(b)) => f(a, b).filter(|r| r.is_finite()).map_or(Value::Null, Value::Float),
        _ => Value::Null,
    }
}

fn compare(left: &Value, right: &Value, test: fn(Ordering) -> bool) -> Value {
    left.compare(right).map_or(Value::Null, |o| Value::Bool(test(o)))
}

fn logical(left: &Value, right: &Value, f: fn(bool, bool) -> bool) -> Value {
    match (left.as_bool(), right.as_bool()) {
        (Some(a), Some(b)) => Value::Bool(f(a, b)),
        _ => Value::Null,
    }
}
