//! `Array` and `Array.prototype`

use std::cmp::Ordering;

use super::{arg, define_method, relative_index, with_prototype};
use crate::engine::executor::Interpreter;
use crate::engine::realm::Realm;
use crate::engine::value::{ArrayRef, Exception, NativeFunction, Value};

const MAX_LENGTH: f64 = (1u32 << 24) as f64;

pub fn install(realm: &Realm) {
    let array = NativeFunction::new("Array", construct).with_constructor(construct);
    let array = with_prototype(array, &realm.prototypes().array)
        .with_property(
            "isArray",
            NativeFunction::new("isArray", |_, _, args| {
                Ok(Value::Bool(matches!(arg(&args, 0), Value::Array(_))))
            })
            .into_value(),
        )
        .with_property("of", NativeFunction::new("of", |_, _, args| Ok(Value::array(args))).into_value())
        .with_property("from", NativeFunction::new("from", from).into_value());
    realm.define_global("Array", array.into_value());

    install_prototype(realm);
}

fn construct(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> Result<Value, Exception> {
    match args.as_slice() {
        [Value::Number(n)] => {
            if *n < 0.0 || n.fract() != 0.0 || *n > MAX_LENGTH {
                return Err(interp.range_error("Invalid array length"));
            }
            Ok(Value::array(vec![Value::Undefined; *n as usize]))
        }
        _ => Ok(Value::array(args)),
    }
}

fn from(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> Result<Value, Exception> {
    let source = arg(&args, 0);
    let items = match &source {
        Value::Array(_) | Value::String(_) | Value::Bytes(_) => interp.iterate(&source)?,
        Value::Object(_) => {
            let length = interp.get_property(&source, "length")?.to_integer();
            if !(0.0..=MAX_LENGTH).contains(&length) {
                return Err(interp.range_error("Invalid array length"));
            }
            let mut items = Vec::with_capacity(length as usize);
            for i in 0..length as usize {
                items.push(interp.get_property(&source, &i.to_string())?);
            }
            items
        }
        Value::Undefined | Value::Null => {
            return Err(interp.type_error(format!("{} is not iterable", source.kind_name())))
        }
        _ => Vec::new(),
    };
    let map = arg(&args, 1);
    if map.is_nullish() {
        return Ok(Value::array(items));
    }
    let mut mapped = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        mapped.push(interp.call_value(&map, Value::Undefined, vec![item, Value::Number(i as f64)])?);
    }
    Ok(Value::array(mapped))
}

fn this_array(interp: &Interpreter, this: &Value, method: &str) -> Result<ArrayRef, Exception> {
    match this {
        Value::Array(items) => Ok(items.clone()),
        other => Err(interp.type_error(format!(
            "Array.prototype.{} called on {}",
            method,
            other.kind_name()
        ))),
    }
}

fn require_callable(interp: &Interpreter, value: &Value) -> Result<(), Exception> {
    if value.is_callable() {
        Ok(())
    } else {
        Err(interp.type_error(format!("{} is not a function", value.to_display_string())))
    }
}

/// Run `callback(item, index, array)` over a snapshot of the array
fn visit<F>(interp: &mut Interpreter, this: &Value, args: &[Value], method: &str, mut each: F) -> Result<(), Exception>
where
    F: FnMut(usize, &Value, Value) -> bool,
{
    let items = this_array(interp, this, method)?.borrow().clone();
    let callback = arg(args, 0);
    require_callable(interp, &callback)?;
    let this_arg = arg(args, 1);
    for (i, item) in items.into_iter().enumerate() {
        let result = interp.call_value(
            &callback,
            this_arg.clone(),
            vec![item.clone(), Value::Number(i as f64), this.clone()],
        )?;
        if !each(i, &item, result) {
            break;
        }
    }
    Ok(())
}

fn install_prototype(realm: &Realm) {
    let proto = &realm.prototypes().array;

    // ------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------

    define_method(proto, "push", |interp, this, args| {
        let items = this_array(interp, &this, "push")?;
        let mut items = items.borrow_mut();
        if (items.len() + args.len()) as f64 > MAX_LENGTH {
            return Err(interp.range_error("Invalid array length"));
        }
        items.extend(args);
        Ok(Value::Number(items.len() as f64))
    });
    define_method(proto, "pop", |interp, this, _| {
        let items = this_array(interp, &this, "pop")?;
        let popped = items.borrow_mut().pop();
        Ok(popped.unwrap_or_default())
    });
    define_method(proto, "shift", |interp, this, _| {
        let items = this_array(interp, &this, "shift")?;
        let mut items = items.borrow_mut();
        if items.is_empty() {
            return Ok(Value::Undefined);
        }
        Ok(items.remove(0))
    });
    define_method(proto, "unshift", |interp, this, args| {
        let items = this_array(interp, &this, "unshift")?;
        let mut items = items.borrow_mut();
        items.splice(0..0, args);
        Ok(Value::Number(items.len() as f64))
    });
    define_method(proto, "splice", |interp, this, args| {
        let items = this_array(interp, &this, "splice")?;
        let mut items = items.borrow_mut();
        let len = items.len();
        let start = relative_index(&arg(&args, 0), len, 0);
        let delete_count = match args.len() {
            0 => 0,
            1 => len - start,
            _ => (arg(&args, 1).to_integer().max(0.0) as usize).min(len - start),
        };
        let inserted: Vec<Value> = args.into_iter().skip(2).collect();
        let removed: Vec<Value> = items.splice(start..start + delete_count, inserted).collect();
        Ok(Value::array(removed))
    });
    define_method(proto, "reverse", |interp, this, _| {
        this_array(interp, &this, "reverse")?.borrow_mut().reverse();
        Ok(this)
    });
    define_method(proto, "fill", |interp, this, args| {
        let items = this_array(interp, &this, "fill")?;
        let mut items = items.borrow_mut();
        let len = items.len();
        let start = relative_index(&arg(&args, 1), len, 0);
        let end = relative_index(&arg(&args, 2), len, len);
        let value = arg(&args, 0);
        for slot in items.iter_mut().take(end).skip(start) {
            *slot = value.clone();
        }
        Ok(this)
    });
    define_method(proto, "sort", |interp, this, args| {
        let items = this_array(interp, &this, "sort")?;
        let comparator = arg(&args, 0);
        if !comparator.is_nullish() {
            require_callable(interp, &comparator)?;
        }
        let snapshot = items.borrow().clone();
        let sorted = merge_sort(snapshot, &mut |a: &Value, b: &Value| compare_items(interp, &comparator, a, b))?;
        *items.borrow_mut() = sorted;
        Ok(this)
    });

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    define_method(proto, "slice", |interp, this, args| {
        let items = this_array(interp, &this, "slice")?;
        let items = items.borrow();
        let len = items.len();
        let start = relative_index(&arg(&args, 0), len, 0);
        let end = relative_index(&arg(&args, 1), len, len);
        Ok(Value::array(items.get(start..end.max(start)).map(<[Value]>::to_vec).unwrap_or_default()))
    });
    define_method(proto, "concat", |interp, this, args| {
        let mut result = this_array(interp, &this, "concat")?.borrow().clone();
        for value in args {
            match value {
                Value::Array(other) => result.extend(other.borrow().iter().cloned()),
                other => result.push(other),
            }
        }
        Ok(Value::array(result))
    });
    define_method(proto, "join", |interp, this, args| {
        let items = this_array(interp, &this, "join")?;
        let separator = match arg(&args, 0) {
            Value::Undefined => ",".to_string(),
            other => other.to_display_string(),
        };
        let joined = join(&items.borrow(), &separator);
        Ok(Value::from(joined))
    });
    define_method(proto, "toString", |interp, this, _| {
        let items = this_array(interp, &this, "toString")?;
        let joined = join(&items.borrow(), ",");
        Ok(Value::from(joined))
    });
    define_method(proto, "indexOf", |interp, this, args| {
        let items = this_array(interp, &this, "indexOf")?;
        let items = items.borrow();
        let start = relative_index(&arg(&args, 1), items.len(), 0);
        let needle = arg(&args, 0);
        Ok(position(items.iter().enumerate().skip(start), |v| v.strict_equals(&needle)))
    });
    define_method(proto, "lastIndexOf", |interp, this, args| {
        let items = this_array(interp, &this, "lastIndexOf")?;
        let items = items.borrow();
        let needle = arg(&args, 0);
        Ok(position(items.iter().enumerate().rev(), |v| v.strict_equals(&needle)))
    });
    define_method(proto, "includes", |interp, this, args| {
        let items = this_array(interp, &this, "includes")?;
        let needle = arg(&args, 0);
        let found = items.borrow().iter().any(|v| v.same_value_zero(&needle));
        Ok(Value::Bool(found))
    });
    define_method(proto, "at", |interp, this, args| {
        let items = this_array(interp, &this, "at")?;
        let items = items.borrow();
        let n = arg(&args, 0).to_integer();
        let index = if n < 0.0 { items.len() as f64 + n } else { n };
        if index < 0.0 {
            return Ok(Value::Undefined);
        }
        Ok(items.get(index as usize).cloned().unwrap_or_default())
    });
    define_method(proto, "flat", |interp, this, args| {
        let items = this_array(interp, &this, "flat")?;
        let depth = match arg(&args, 0) {
            Value::Undefined => 1.0,
            other => other.to_integer(),
        };
        let mut out = Vec::new();
        flatten(&items.borrow(), depth, &mut out);
        Ok(Value::array(out))
    });

    // ------------------------------------------------------------------
    // Iteration
    // ------------------------------------------------------------------

    define_method(proto, "forEach", |interp, this, args| {
        visit(interp, &this, &args, "forEach", |_, _, _| true)?;
        Ok(Value::Undefined)
    });
    define_method(proto, "map", |interp, this, args| {
        let mut out = Vec::new();
        visit(interp, &this, &args, "map", |_, _, result| {
            out.push(result);
            true
        })?;
        Ok(Value::array(out))
    });
    define_method(proto, "flatMap", |interp, this, args| {
        let mut out = Vec::new();
        visit(interp, &this, &args, "flatMap", |_, _, result| {
            match result {
                Value::Array(inner) => out.extend(inner.borrow().iter().cloned()),
                other => out.push(other),
            }
            true
        })?;
        Ok(Value::array(out))
    });
    define_method(proto, "filter", |interp, this, args| {
        let mut out = Vec::new();
        visit(interp, &this, &args, "filter", |_, item, result| {
            if result.truthy() {
                out.push(item.clone());
            }
            true
        })?;
        Ok(Value::array(out))
    });
    define_method(proto, "find", |interp, this, args| {
        let mut found = Value::Undefined;
        visit(interp, &this, &args, "find", |_, item, result| {
            if result.truthy() {
                found = item.clone();
                return false;
            }
            true
        })?;
        Ok(found)
    });
    define_method(proto, "findIndex", |interp, this, args| {
        let mut found = -1.0;
        visit(interp, &this, &args, "findIndex", |i, _, result| {
            if result.truthy() {
                found = i as f64;
                return false;
            }
            true
        })?;
        Ok(Value::Number(found))
    });
    define_method(proto, "some", |interp, this, args| {
        let mut any = false;
        visit(interp, &this, &args, "some", |_, _, result| {
            any = result.truthy();
            !any
        })?;
        Ok(Value::Bool(any))
    });
    define_method(proto, "every", |interp, this, args| {
        let mut all = true;
        visit(interp, &this, &args, "every", |_, _, result| {
            all = result.truthy();
            all
        })?;
        Ok(Value::Bool(all))
    });
    define_method(proto, "reduce", |interp, this, args| {
        let items = this_array(interp, &this, "reduce")?.borrow().clone();
        reduce(interp, &this, items.into_iter().enumerate().collect(), &args)
    });
    define_method(proto, "reduceRight", |interp, this, args| {
        let items = this_array(interp, &this, "reduceRight")?.borrow().clone();
        reduce(interp, &this, items.into_iter().enumerate().rev().collect(), &args)
    });
}

fn reduce(
    interp: &mut Interpreter,
    this: &Value,
    items: Vec<(usize, Value)>,
    args: &[Value],
) -> Result<Value, Exception> {
    let callback = arg(args, 0);
    require_callable(interp, &callback)?;
    let mut items = items.into_iter();
    let mut accumulator = if args.len() >= 2 {
        args[1].clone()
    } else {
        match items.next() {
            Some((_, first)) => first,
            None => return Err(interp.type_error("Reduce of empty array with no initial value")),
        }
    };
    for (i, item) in items {
        accumulator = interp.call_value(
            &callback,
            Value::Undefined,
            vec![accumulator, item, Value::Number(i as f64), this.clone()],
        )?;
    }
    Ok(accumulator)
}

fn position<'a, I>(mut iter: I, matches: impl Fn(&Value) -> bool) -> Value
where
    I: Iterator<Item = (usize, &'a Value)>,
{
    let index = iter.find(|(_, v)| matches(v)).map(|(i, _)| i as f64).unwrap_or(-1.0);
    Value::Number(index)
}

fn join(items: &[Value], separator: &str) -> String {
    items
        .iter()
        .map(|v| if v.is_nullish() { String::new() } else { v.to_display_string() })
        .collect::<Vec<_>>()
        .join(separator)
}

fn flatten(items: &[Value], depth: f64, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) if depth >= 1.0 => flatten(&inner.borrow(), depth - 1.0, out),
            other => out.push(other.clone()),
        }
    }
}

/// Default ordering compares string forms; `undefined` always sorts last
fn compare_items(
    interp: &mut Interpreter,
    comparator: &Value,
    a: &Value,
    b: &Value,
) -> Result<Ordering, Exception> {
    match (a, b) {
        (Value::Undefined, Value::Undefined) => return Ok(Ordering::Equal),
        (Value::Undefined, _) => return Ok(Ordering::Greater),
        (_, Value::Undefined) => return Ok(Ordering::Less),
        _ => {}
    }
    if comparator.is_nullish() {
        return Ok(a.to_display_string().cmp(&b.to_display_string()));
    }
    let result = interp
        .call_value(comparator, Value::Undefined, vec![a.clone(), b.clone()])?
        .to_number();
    Ok(if result < 0.0 {
        Ordering::Less
    } else if result > 0.0 {
        Ordering::Greater
    } else {
        Ordering::Equal
    })
}

/// Stable merge sort with a fallible comparator. Tolerates comparators
/// that are not a total order.
fn merge_sort<F>(mut items: Vec<Value>, cmp: &mut F) -> Result<Vec<Value>, Exception>
where
    F: FnMut(&Value, &Value) -> Result<Ordering, Exception>,
{
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(items, cmp)?;
    let right = merge_sort(right, cmp)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
        if cmp(l, r)? == Ordering::Greater {
            merged.extend(right.next());
        } else {
            merged.extend(left.next());
        }
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use crate::engine::builtins::test_support::{eval, eval_number, eval_string};

    #[test]
    fn test_constructor_forms() {
        assert_eq!(eval_number("new Array(3).length"), 3.0);
        assert_eq!(eval_string("Array(1, 2).join('-')"), "1-2");
        assert_eq!(eval_string("Array.of(7).join()"), "7");
        assert!(eval("new Array(-1)").is_err());
        assert_eq!(eval_string("Array.isArray([]) && !Array.isArray({})"), "true");
    }

    #[test]
    fn test_array_from() {
        assert_eq!(eval_string("Array.from('abc').join()"), "a,b,c");
        assert_eq!(eval_string("Array.from({length: 3}, (_, i) => i * 2).join()"), "0,2,4");
    }

    #[test]
    fn test_mutators() {
        assert_eq!(eval_string("const a = [1, 2]; a.push(3, 4); a.join()"), "1,2,3,4");
        assert_eq!(eval_string("const a = [1, 2, 3]; [a.pop(), a.shift(), a.join()].join('|')"), "3|1|2");
        assert_eq!(eval_string("const a = [3]; a.unshift(1, 2); a.join()"), "1,2,3");
        assert_eq!(
            eval_string("const a = [1, 2, 3, 4]; const r = a.splice(1, 2, 'x'); a.join() + '|' + r.join()"),
            "1,x,4|2,3"
        );
        assert_eq!(eval_string("[1, 2, 3].reverse().join()"), "3,2,1");
        assert_eq!(eval_string("new Array(3).fill(0).join()"), "0,0,0");
    }

    #[test]
    fn test_sort() {
        assert_eq!(eval_string("[10, 9, 1].sort().join()"), "1,10,9");
        assert_eq!(eval_string("[10, 9, 1].sort((a, b) => a - b).join()"), "1,9,10");
        assert_eq!(eval_string("[undefined, 'b', 'a'].sort().map(String).join()"), "a,b,undefined");
        assert!(eval("[2, 1].sort((a, b) => { throw new Error('cmp') })").is_err());
    }

    #[test]
    fn test_accessors() {
        assert_eq!(eval_string("[1, 2, 3, 4].slice(1, -1).join()"), "2,3");
        assert_eq!(eval_string("[1].concat([2, 3], 4).join()"), "1,2,3,4");
        assert_eq!(eval_number("[1, 2, 1].indexOf(1, 1)"), 2.0);
        assert_eq!(eval_number("[1, 2, 1].lastIndexOf(1)"), 2.0);
        assert_eq!(eval_string("[NaN].includes(NaN)"), "true");
        assert_eq!(eval_number("[1, 2, 3].at(-1)"), 3.0);
        assert_eq!(eval_string("[1, [2, [3, [4]]]].flat(2).length"), "4");
        assert_eq!(eval_string("[1, null, 2].join('-')"), "1--2");
    }

    #[test]
    fn test_iteration_methods() {
        assert_eq!(eval_string("[1, 2, 3].map(x => x * 2).join()"), "2,4,6");
        assert_eq!(eval_string("[1, 2, 3, 4].filter(x => x % 2 === 0).join()"), "2,4");
        assert_eq!(eval_number("[5, 6, 7].find(x => x > 5)"), 6.0);
        assert_eq!(eval_number("[5, 6, 7].findIndex(x => x > 9)"), -1.0);
        assert_eq!(eval_string("[1, 2].some(x => x > 1) && [1, 2].every(x => x > 0)"), "true");
        assert_eq!(eval_number("[1, 2, 3].reduce((a, b) => a + b)"), 6.0);
        assert_eq!(eval_string("['a', 'b', 'c'].reduceRight((a, b) => a + b, '')"), "cba");
        assert_eq!(eval_string("[1, 2].flatMap(x => [x, x]).join()"), "1,1,2,2");
        assert_eq!(eval_number("let s = 0; [1, 2, 3].forEach(x => { s += x }); s"), 6.0);
    }

    #[test]
    fn test_reduce_empty_without_initial_fails() {
        assert!(eval("[].reduce((a, b) => a + b)").is_err());
    }

    #[test]
    fn test_callback_must_be_callable() {
        assert!(eval("[1].map(5)").is_err());
    }
}
