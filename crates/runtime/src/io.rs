//! `print` and `println`
//!
//! Both take their variadic arguments as a collected slice, stringify each
//! element with the standard stringer, and write to the machine's output
//! sink. Write failures on the sink do not fail the machine step; the sink
//! is the host's concern.

use crate::machine::Machine;
use std::io::Write;
use tern_core::errors::RuntimeError;

pub fn builtin_print(m: &mut Machine) -> Result<(), RuntimeError> {
    let line = render_args(m)?;
    let _ = m.output.write_all(line.as_bytes());
    Ok(())
}

pub fn builtin_println(m: &mut Machine) -> Result<(), RuntimeError> {
    let mut line = render_args(m)?;
    line.push('\n');
    let _ = m.output.write_all(line.as_bytes());
    Ok(())
}

/// Stringify the variadic slice, space-separated.
fn render_args(m: &mut Machine) -> Result<String, RuntimeError> {
    let xs = m.params1();
    let n = xs.get_length()?;
    let mut parts = Vec::with_capacity(n);
    for i in 0..n {
        let ev = xs.get_pointer_at_index(&*m.store, i)?.deref()?;
        parts.push(ev.sprint());
    }
    Ok(parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::SharedBuffer;
    use std::rc::Rc;
    use tern_core::typed_value::{TypedValue, typed_bool, typed_int, typed_string};
    use tern_core::types::{SliceType, Type};
    use tern_core::value::{ArrayData, Value};

    fn varargs(m: &mut Machine, items: Vec<TypedValue>) -> TypedValue {
        let n = items.len();
        let base = m.alloc.new_list_array(n).unwrap();
        {
            let mut arr = base.borrow_mut();
            let ArrayData::List(list) = &mut arr.data else {
                unreachable!()
            };
            for (i, tv) in items.into_iter().enumerate() {
                list[i] = tv;
            }
        }
        TypedValue {
            t: Some(Rc::new(Type::Slice(SliceType {
                elt: Rc::new(Type::Interface(tern_core::types::InterfaceType {
                    pkg_path: String::new(),
                    methods: vec![],
                })),
                vrd: true,
            }))),
            v: Value::Slice(m.alloc.new_slice(base, 0, n, n).unwrap()),
        }
    }

    #[test]
    fn test_println_joins_with_spaces_and_newline() {
        let out = SharedBuffer::new();
        let mut m = Machine::builder().with_output(Box::new(out.clone())).build();
        let args = varargs(
            &mut m,
            vec![typed_string("total"), typed_int(42), typed_bool(true)],
        );
        m.call_builtin("println", vec![args]).unwrap();
        assert_eq!(out.contents(), "total 42 true\n");
    }

    #[test]
    fn test_print_no_trailing_newline() {
        let out = SharedBuffer::new();
        let mut m = Machine::builder().with_output(Box::new(out.clone())).build();
        let args = varargs(&mut m, vec![typed_int(1), typed_int(2)]);
        m.call_builtin("print", vec![args]).unwrap();
        assert_eq!(out.contents(), "1 2");
    }

    #[test]
    fn test_println_empty_args() {
        let out = SharedBuffer::new();
        let mut m = Machine::builder().with_output(Box::new(out.clone())).build();
        let args = varargs(&mut m, vec![]);
        m.call_builtin("println", vec![args]).unwrap();
        assert_eq!(out.contents(), "\n");
    }

    #[test]
    fn test_println_nil_and_undefined() {
        let out = SharedBuffer::new();
        let mut m = Machine::builder().with_output(Box::new(out.clone())).build();
        let typed_nil = TypedValue {
            t: Some(tern_core::types::byte_slice_type(false)),
            v: Value::Null,
        };
        let args = varargs(&mut m, vec![typed_nil, TypedValue::default()]);
        m.call_builtin("println", vec![args]).unwrap();
        assert_eq!(out.contents(), "nil undefined\n");
    }
}
