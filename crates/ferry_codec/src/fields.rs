//! Struct field resolution.
//!
//! Turns the declared fields of a struct, including fields promoted through
//! `flatten`, into a flat [`StructLayout`] with resolved wire names, access
//! paths, and per-field codecs. Promotion follows depth-then-tag shadowing: a
//! directly declared field always beats a promoted one, and among promoted
//! fields with the same name a single renamed field beats the unrenamed rest.

use core::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::Codec;
use crate::compile::{Seen, compile};
use crate::desc::{StructDesc, TypeDesc, TypeRef};
use crate::error::Error;
use crate::keyset::Keyset;
use crate::ops::{BoxedOps, GetFn, GetMutFn, OptionOps};
use crate::registry::CodecOptions;

// -----------------------------------------------------------------------------
// Access paths

/// One hop in a field's access path from the root struct value.
#[derive(Clone, Copy)]
pub(crate) enum Step {
    Get { get: GetFn, get_mut: GetMutFn },
    Deref { ops: BoxedOps },
    Opt { exported: bool, ops: OptionOps },
}

/// A resolved field of a struct layout.
pub(crate) struct Field {
    pub name: String,
    pub omit_empty: bool,
    pub index: u64,
    pub path: Vec<Step>,
    pub ty: TypeRef,
    pub codec: Arc<dyn Codec>,
}

impl Field {
    /// Projects the field out of the root for encoding. Returns `None` when
    /// the path crosses an absent `Option`, which skips the field entirely.
    pub(crate) fn project<'a>(&self, root: &'a dyn Any) -> Option<&'a dyn Any> {
        let mut value = root;
        for step in &self.path {
            value = match step {
                Step::Get { get, .. } => get(value),
                Step::Deref { ops } => (ops.get)(value),
                Step::Opt { ops, .. } => (ops.get)(value)?,
            };
        }
        Some(value)
    }

    /// Projects the field out of the root for decoding, materializing absent
    /// `Option`s along the path.
    pub(crate) fn project_mut<'a>(&self, root: &'a mut dyn Any) -> Result<&'a mut dyn Any, Error> {
        let mut value = root;
        for step in &self.path {
            value = match step {
                Step::Get { get_mut, .. } => get_mut(value),
                Step::Deref { ops } => (ops.get_mut)(value),
                Step::Opt { exported, ops } => {
                    if !exported && !(ops.is_some)(value) {
                        return Err(Error::message(format!(
                            "cannot set embedded pointer to unexported struct: {}",
                            self.ty.name
                        )));
                    }
                    (ops.get_or_insert)(value)
                }
            };
        }
        Ok(value)
    }
}

// -----------------------------------------------------------------------------
// StructLayout

/// The resolved shape of a struct: fields in wire order plus the name lookup
/// tables used during decoding.
pub(crate) struct StructLayout {
    pub name: &'static str,
    pub fields: Vec<Field>,
    exact: HashMap<String, usize>,
    fold: HashMap<String, usize>,
    keyset: Option<Keyset>,
}

impl StructLayout {
    fn new(name: &'static str, fields: Vec<Field>) -> Self {
        let mut exact = HashMap::with_capacity(fields.len());
        let mut fold = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            exact.entry(field.name.clone()).or_insert(i);
            fold.entry(fold_lower(&field.name)).or_insert(i);
        }
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        let keyset = Keyset::new(&names);
        Self {
            name,
            fields,
            exact,
            fold,
            keyset,
        }
    }

    /// Resolves an incoming key to a field, trying an exact match first and
    /// an ASCII-and-Unicode case fold second.
    pub(crate) fn lookup(&self, key: &str) -> Option<&Field> {
        let exact = match &self.keyset {
            Some(keyset) => keyset.lookup(key.as_bytes()),
            None => self.exact.get(key).copied(),
        };
        let idx = match exact {
            Some(idx) => idx,
            None => *self.fold.get(&fold_lower(key))?,
        };
        Some(&self.fields[idx])
    }
}

fn fold_lower(s: &str) -> String {
    if s.is_ascii() {
        s.to_ascii_lowercase()
    } else {
        s.chars().flat_map(char::to_lowercase).collect()
    }
}

/// Wire names may contain alphanumerics plus a fixed set of punctuation. A
/// rename that fails this check is ignored, though the field still counts as
/// renamed for shadowing purposes.
fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || "!#$%&()*+-./:;<=>?@[]^_{|}~ ".contains(c))
}

// -----------------------------------------------------------------------------
// Resolution

struct Candidate {
    name: String,
    tagged: bool,
    omit_empty: bool,
    embedded: bool,
    index: u64,
    path: Vec<Step>,
    ty: TypeRef,
}

pub(crate) fn resolve_struct(
    desc: &StructDesc,
    seen: &mut Seen,
    options: &CodecOptions,
) -> StructLayout {
    let mut candidates = Vec::new();
    let mut stack = Vec::new();
    append_fields(&mut candidates, desc, 0, &[], false, seen, &mut stack);

    let mut ambiguous_names: HashMap<String, usize> = HashMap::new();
    let mut ambiguous_tags: HashMap<String, usize> = HashMap::new();
    for c in &candidates {
        *ambiguous_names.entry(c.name.clone()).or_default() += 1;
        if !c.embedded || c.tagged {
            *ambiguous_tags.entry(c.name.clone()).or_default() += 1;
        }
    }

    let mut fields: Vec<Field> = Vec::with_capacity(candidates.len());
    for c in candidates {
        if c.embedded {
            let name_count = ambiguous_names[c.name.as_str()];
            let tag_count = ambiguous_tags.get(c.name.as_str()).copied().unwrap_or(0);
            if name_count > 1 && !(c.tagged && tag_count == 1) {
                continue;
            }
        }
        fields.push(Field {
            name: c.name,
            omit_empty: c.omit_empty,
            index: c.index,
            path: c.path,
            ty: c.ty,
            codec: compile(&c.ty, seen, options),
        });
    }
    fields.sort_by_key(|f| f.index);

    StructLayout::new(desc.name, fields)
}

fn append_fields(
    out: &mut Vec<Candidate>,
    desc: &StructDesc,
    base_index: u64,
    base_path: &[Step],
    embedded: bool,
    seen: &mut Seen,
    stack: &mut Vec<TypeId>,
) {
    for (i, decl) in desc.fields.iter().enumerate() {
        if decl.skip || (!decl.exported && !decl.flatten) {
            continue;
        }
        let index = if embedded {
            base_index | i as u64
        } else {
            (i as u64) << 32
        };

        if decl.flatten && decl.rename.is_none() {
            let mut path = base_path.to_vec();
            path.push(Step::Get {
                get: decl.get,
                get_mut: decl.get_mut,
            });
            let mut target = decl.ty;
            let mut target_desc = (target.describe)();
            loop {
                match target_desc {
                    TypeDesc::Boxed(d) => {
                        path.push(Step::Deref { ops: d.ops });
                        target = d.elem;
                    }
                    TypeDesc::Option(d) => {
                        path.push(Step::Opt {
                            exported: decl.exported,
                            ops: d.ops,
                        });
                        target = d.elem;
                    }
                    _ => break,
                }
                target_desc = (target.describe)();
            }
            match target_desc {
                TypeDesc::Struct(sub) => {
                    // A flatten target already being resolved contributes no
                    // fields; that bounds recursive embeddings.
                    if !seen.in_progress(&target.id) && !stack.contains(&target.id) {
                        stack.push(target.id);
                        append_fields(out, &sub, index, &path, true, seen, stack);
                        stack.pop();
                    }
                }
                _ if decl.exported => {
                    // Flattening a non-struct degrades to a regular field.
                    out.push(Candidate {
                        name: decl.name.to_owned(),
                        tagged: false,
                        omit_empty: decl.omit_empty,
                        embedded,
                        index,
                        path: plain_path(base_path, decl.get, decl.get_mut),
                        ty: decl.ty,
                    });
                }
                _ => {}
            }
            continue;
        }

        let mut name = decl.name.to_owned();
        let mut tagged = false;
        if let Some(rename) = decl.rename {
            tagged = true;
            if valid_name(rename) {
                name = rename.to_owned();
            }
        }
        out.push(Candidate {
            name,
            // Promoted fields keep their tag only for shadowing; a field of
            // the root struct never needs it after resolution.
            tagged: tagged && embedded,
            omit_empty: decl.omit_empty,
            embedded,
            index,
            path: plain_path(base_path, decl.get, decl.get_mut),
            ty: decl.ty,
        });
    }
}

fn plain_path(base: &[Step], get: GetFn, get_mut: GetMutFn) -> Vec<Step> {
    let mut path = base.to_vec();
    path.push(Step::Get { get, get_mut });
    path
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::{Described, FieldDecl, StructDesc, TypeDesc};
    use crate::ops::{downcast_mut, downcast_ref};

    #[derive(Default)]
    struct Inner {
        a: i32,
        b: i32,
    }

    impl Described for Inner {
        fn describe() -> TypeDesc {
            TypeDesc::Struct(StructDesc {
                name: "Inner",
                fields: vec![
                    decl("a", |v| &downcast_ref::<Inner>(v).a, |v| {
                        &mut downcast_mut::<Inner>(v).a
                    }),
                    decl("b", |v| &downcast_ref::<Inner>(v).b, |v| {
                        &mut downcast_mut::<Inner>(v).b
                    }),
                ],
            })
        }
    }

    fn decl(name: &'static str, get: GetFn, get_mut: GetMutFn) -> FieldDecl {
        FieldDecl {
            name,
            rename: None,
            skip: false,
            omit_empty: false,
            flatten: false,
            exported: true,
            ty: TypeRef::of::<i32>(),
            get,
            get_mut,
        }
    }

    fn resolve(desc: &StructDesc) -> StructLayout {
        resolve_struct(desc, &mut Seen::default(), &CodecOptions::default())
    }

    #[test]
    fn declared_field_shadows_promoted() {
        #[derive(Default)]
        struct Outer {
            a: i32,
            inner: Inner,
        }

        let desc = StructDesc {
            name: "Outer",
            fields: vec![
                decl("a", |v| &downcast_ref::<Outer>(v).a, |v| {
                    &mut downcast_mut::<Outer>(v).a
                }),
                FieldDecl {
                    name: "inner",
                    rename: None,
                    skip: false,
                    omit_empty: false,
                    flatten: true,
                    exported: true,
                    ty: TypeRef::of::<Inner>(),
                    get: |v| &downcast_ref::<Outer>(v).inner,
                    get_mut: |v| &mut downcast_mut::<Outer>(v).inner,
                },
            ],
        };

        let layout = resolve(&desc);
        let names: Vec<&str> = layout.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);

        let outer = Outer {
            a: 1,
            inner: Inner { a: 2, b: 3 },
        };
        let field_a = layout.lookup("a").unwrap();
        assert_eq!(
            downcast_ref::<i32>(field_a.project(&outer).unwrap()),
            &1,
            "the declared field wins"
        );
        let field_b = layout.lookup("b").unwrap();
        assert_eq!(downcast_ref::<i32>(field_b.project(&outer).unwrap()), &3);
    }

    #[test]
    fn renamed_promotion_wins_over_plain() {
        #[derive(Default)]
        struct Tagged {
            x: i32,
        }

        impl Described for Tagged {
            fn describe() -> TypeDesc {
                TypeDesc::Struct(StructDesc {
                    name: "Tagged",
                    fields: vec![FieldDecl {
                        name: "x",
                        rename: Some("a"),
                        skip: false,
                        omit_empty: false,
                        flatten: false,
                        exported: true,
                        ty: TypeRef::of::<i32>(),
                        get: |v| &downcast_ref::<Tagged>(v).x,
                        get_mut: |v| &mut downcast_mut::<Tagged>(v).x,
                    }],
                })
            }
        }

        #[derive(Default)]
        struct Outer {
            tagged: Tagged,
            inner: Inner,
        }

        let flatten_decl = |name: &'static str, ty, get, get_mut| FieldDecl {
            name,
            rename: None,
            skip: false,
            omit_empty: false,
            flatten: true,
            exported: true,
            ty,
            get,
            get_mut,
        };
        let desc = StructDesc {
            name: "Outer",
            fields: vec![
                flatten_decl(
                    "tagged",
                    TypeRef::of::<Tagged>(),
                    |v| &downcast_ref::<Outer>(v).tagged,
                    |v| &mut downcast_mut::<Outer>(v).tagged,
                ),
                flatten_decl(
                    "inner",
                    TypeRef::of::<Inner>(),
                    |v| &downcast_ref::<Outer>(v).inner,
                    |v| &mut downcast_mut::<Outer>(v).inner,
                ),
            ],
        };

        let layout = resolve(&desc);
        let names: Vec<&str> = layout.fields.iter().map(|f| f.name.as_str()).collect();
        // Both flatten targets promote an "a": the renamed one survives, the
        // plain one is dropped, and "b" is untouched.
        assert_eq!(names, ["a", "b"]);

        let outer = Outer {
            tagged: Tagged { x: 9 },
            inner: Inner { a: 2, b: 3 },
        };
        let field_a = layout.lookup("a").unwrap();
        assert_eq!(downcast_ref::<i32>(field_a.project(&outer).unwrap()), &9);
    }

    #[test]
    fn ambiguous_promotions_drop_both() {
        #[derive(Default)]
        struct Other {
            a: i32,
        }

        impl Described for Other {
            fn describe() -> TypeDesc {
                TypeDesc::Struct(StructDesc {
                    name: "Other",
                    fields: vec![decl("a", |v| &downcast_ref::<Other>(v).a, |v| {
                        &mut downcast_mut::<Other>(v).a
                    })],
                })
            }
        }

        #[derive(Default)]
        struct Outer {
            inner: Inner,
            other: Other,
        }

        let desc = StructDesc {
            name: "Outer",
            fields: vec![
                FieldDecl {
                    name: "inner",
                    rename: None,
                    skip: false,
                    omit_empty: false,
                    flatten: true,
                    exported: true,
                    ty: TypeRef::of::<Inner>(),
                    get: |v| &downcast_ref::<Outer>(v).inner,
                    get_mut: |v| &mut downcast_mut::<Outer>(v).inner,
                },
                FieldDecl {
                    name: "other",
                    rename: None,
                    skip: false,
                    omit_empty: false,
                    flatten: true,
                    exported: true,
                    ty: TypeRef::of::<Other>(),
                    get: |v| &downcast_ref::<Outer>(v).other,
                    get_mut: |v| &mut downcast_mut::<Outer>(v).other,
                },
            ],
        };

        let layout = resolve(&desc);
        let names: Vec<&str> = layout.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["b"]);
    }

    #[test]
    fn optional_embedding_projects_and_materializes() {
        #[derive(Default)]
        struct Outer {
            inner: Option<Inner>,
        }

        let desc = StructDesc {
            name: "Outer",
            fields: vec![FieldDecl {
                name: "inner",
                rename: None,
                skip: false,
                omit_empty: false,
                flatten: true,
                exported: true,
                ty: TypeRef::of::<Option<Inner>>(),
                get: |v| &downcast_ref::<Outer>(v).inner,
                get_mut: |v| &mut downcast_mut::<Outer>(v).inner,
            }],
        };

        let layout = resolve(&desc);
        let field_a = layout.lookup("a").unwrap();

        let mut outer = Outer { inner: None };
        assert!(field_a.project(&outer).is_none(), "absent option skips");

        *downcast_mut::<i32>(field_a.project_mut(&mut outer).unwrap()) = 5;
        assert_eq!(outer.inner.as_ref().map(|i| i.a), Some(5));
        assert_eq!(downcast_ref::<i32>(field_a.project(&outer).unwrap()), &5);
    }

    #[test]
    fn restricted_optional_embedding_refuses_to_materialize() {
        #[derive(Default)]
        struct Outer {
            inner: Option<Inner>,
        }

        let desc = StructDesc {
            name: "Outer",
            fields: vec![FieldDecl {
                name: "inner",
                rename: None,
                skip: false,
                omit_empty: false,
                flatten: true,
                exported: false,
                ty: TypeRef::of::<Option<Inner>>(),
                get: |v| &downcast_ref::<Outer>(v).inner,
                get_mut: |v| &mut downcast_mut::<Outer>(v).inner,
            }],
        };

        let layout = resolve(&desc);
        let field_a = layout.lookup("a").unwrap();

        let mut outer = Outer { inner: None };
        let err = field_a.project_mut(&mut outer).unwrap_err();
        assert!(err.to_string().contains("cannot set embedded pointer"));

        outer.inner = Some(Inner::default());
        assert!(field_a.project_mut(&mut outer).is_ok());
    }

    #[test]
    fn case_insensitive_fallback_prefers_first_field() {
        let desc = StructDesc {
            name: "Pair",
            fields: vec![
                decl("Value", |v| &downcast_ref::<Inner>(v).a, |v| {
                    &mut downcast_mut::<Inner>(v).a
                }),
                decl("value", |v| &downcast_ref::<Inner>(v).b, |v| {
                    &mut downcast_mut::<Inner>(v).b
                }),
            ],
        };

        let layout = resolve(&desc);
        assert_eq!(layout.lookup("value").unwrap().name, "value");
        assert_eq!(layout.lookup("Value").unwrap().name, "Value");
        // No exact match: folds to the first declared field.
        assert_eq!(layout.lookup("VALUE").unwrap().name, "Value");
        assert!(layout.lookup("nope").is_none());
    }

    #[test]
    fn invalid_rename_keeps_declared_name() {
        assert!(valid_name("created_at"));
        assert!(valid_name("a b.c|d"));
        assert!(!valid_name(""));
        assert!(!valid_name("tab\tname"));
        assert!(!valid_name("quote\"name"));

        let desc = StructDesc {
            name: "Renamed",
            fields: vec![FieldDecl {
                rename: Some("bad\tname"),
                ..decl("a", |v| &downcast_ref::<Inner>(v).a, |v| {
                    &mut downcast_mut::<Inner>(v).a
                })
            }],
        };
        let layout = resolve(&desc);
        assert_eq!(layout.fields[0].name, "a");
    }
}
