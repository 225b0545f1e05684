//! The source-language type model consumed by the lowering core.
//!
//! Types are structurally interned: `Ty` is `Copy`, compares by pointer, and
//! hashes by pointer. Named types are the one indirection: `TyKind::Named`
//! holds an id into the `TypeStore`, whose definition (underlying type,
//! method set) may be filled in after the `Ty` exists. That indirection is
//! what lets recursive types (`struct S { next *S }`) be built at all.

use crate::ast::ObjId;
use crate::span::Symbol;
use index_vec::{IndexVec, define_index_type};
use internment::Intern;
use std::cell::RefCell;
use std::fmt;

define_index_type! {
    pub struct NamedId = u32;
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ty(Intern<TyKind>);

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TyKind {
    /// A type the checker failed to resolve. Lowering it is a hard error.
    Bad,
    Basic(BasicKind),
    Array { elem: Ty, len: u64 },
    Slice { elem: Ty },
    Struct { fields: Vec<Field> },
    Pointer { base: Ty },
    Func(FuncSig),
    /// Methods are kept sorted by name; witness-table layout and the
    /// binary search at selector sites both depend on it.
    Interface { methods: Vec<MethodSpec> },
    Map { key: Ty, elem: Ty },
    Chan { elem: Ty },
    Named(NamedId),
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BasicKind {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    String,
    UnsafePointer,
    UntypedBool,
    UntypedInt,
    UntypedFloat,
    UntypedString,
    UntypedNil,
}

/// A struct field. An empty name marks an embedded field; its promoted name
/// is the name of the (possibly pointed-to) named type.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Field {
    pub name: Symbol,
    pub ty: Ty,
}

impl Field {
    pub fn named(name: &str, ty: Ty) -> Field {
        Field {
            name: Symbol::new(name),
            ty,
        }
    }

    pub fn embedded(ty: Ty) -> Field {
        Field {
            name: Symbol::new(""),
            ty,
        }
    }

    pub fn is_embedded(&self) -> bool {
        self.name.is_empty()
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FuncSig {
    pub recv: Option<Ty>,
    pub params: Vec<Ty>,
    pub results: Vec<Ty>,
    pub variadic: bool,
}

impl FuncSig {
    pub fn plain(params: Vec<Ty>, results: Vec<Ty>) -> FuncSig {
        FuncSig {
            recv: None,
            params,
            results,
            variadic: false,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodSpec {
    pub name: Symbol,
    pub sig: Ty,
}

/// A method attached to a named type; `func` resolves to the lowered
/// function object.
#[derive(Clone, Debug)]
pub struct Method {
    pub name: Symbol,
    pub sig: Ty,
    pub func: ObjId,
}

struct NamedDef {
    name: Symbol,
    underlying: Ty,
    methods: Vec<Method>,
}

impl Ty {
    pub fn new(kind: TyKind) -> Ty {
        Ty(Intern::new(kind))
    }

    #[inline]
    pub fn kind(&self) -> &'static TyKind {
        self.0.as_ref()
    }

    pub fn basic(kind: BasicKind) -> Ty {
        Ty::new(TyKind::Basic(kind))
    }

    pub fn bad() -> Ty {
        Ty::new(TyKind::Bad)
    }

    pub fn bool_() -> Ty {
        Ty::basic(BasicKind::Bool)
    }

    pub fn int() -> Ty {
        Ty::basic(BasicKind::Int)
    }

    pub fn int32() -> Ty {
        Ty::basic(BasicKind::Int32)
    }

    pub fn uint() -> Ty {
        Ty::basic(BasicKind::Uint)
    }

    pub fn byte() -> Ty {
        Ty::basic(BasicKind::Uint8)
    }

    pub fn uintptr() -> Ty {
        Ty::basic(BasicKind::Uintptr)
    }

    pub fn float64() -> Ty {
        Ty::basic(BasicKind::Float64)
    }

    pub fn string() -> Ty {
        Ty::basic(BasicKind::String)
    }

    pub fn unsafe_pointer() -> Ty {
        Ty::basic(BasicKind::UnsafePointer)
    }

    pub fn untyped_int() -> Ty {
        Ty::basic(BasicKind::UntypedInt)
    }

    pub fn untyped_bool() -> Ty {
        Ty::basic(BasicKind::UntypedBool)
    }

    pub fn untyped_string() -> Ty {
        Ty::basic(BasicKind::UntypedString)
    }

    pub fn pointer(base: Ty) -> Ty {
        Ty::new(TyKind::Pointer { base })
    }

    pub fn array(elem: Ty, len: u64) -> Ty {
        Ty::new(TyKind::Array { elem, len })
    }

    pub fn slice(elem: Ty) -> Ty {
        Ty::new(TyKind::Slice { elem })
    }

    pub fn map(key: Ty, elem: Ty) -> Ty {
        Ty::new(TyKind::Map { key, elem })
    }

    pub fn strukt(fields: Vec<Field>) -> Ty {
        Ty::new(TyKind::Struct { fields })
    }

    pub fn func(sig: FuncSig) -> Ty {
        Ty::new(TyKind::Func(sig))
    }

    /// Interface methods are sorted here so every later consumer can rely
    /// on the order.
    pub fn interface(mut methods: Vec<MethodSpec>) -> Ty {
        methods.sort_by_key(|m| m.name);
        Ty::new(TyKind::Interface { methods })
    }

    pub fn basic_kind(&self) -> Option<BasicKind> {
        match self.kind() {
            TyKind::Basic(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn func_sig(&self) -> Option<&FuncSig> {
        match self.kind() {
            TyKind::Func(sig) => Some(sig),
            _ => None,
        }
    }

    pub fn is_untyped(&self) -> bool {
        matches!(
            self.basic_kind(),
            Some(
                BasicKind::UntypedBool
                    | BasicKind::UntypedInt
                    | BasicKind::UntypedFloat
                    | BasicKind::UntypedString
                    | BasicKind::UntypedNil
            )
        )
    }
}

impl BasicKind {
    pub fn is_integer(self) -> bool {
        use BasicKind::*;
        matches!(
            self,
            Int | Int8
                | Int16
                | Int32
                | Int64
                | Uint
                | Uint8
                | Uint16
                | Uint32
                | Uint64
                | Uintptr
                | UntypedInt
        )
    }

    pub fn is_unsigned(self) -> bool {
        use BasicKind::*;
        matches!(self, Uint | Uint8 | Uint16 | Uint32 | Uint64 | Uintptr)
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            BasicKind::Float32 | BasicKind::Float64 | BasicKind::UntypedFloat
        )
    }

    pub fn is_string(self) -> bool {
        matches!(self, BasicKind::String | BasicKind::UntypedString)
    }

    pub fn is_boolean(self) -> bool {
        matches!(self, BasicKind::Bool | BasicKind::UntypedBool)
    }

    pub fn name(self) -> &'static str {
        use BasicKind::*;
        match self {
            Bool => "bool",
            Int => "int",
            Int8 => "int8",
            Int16 => "int16",
            Int32 => "int32",
            Int64 => "int64",
            Uint => "uint",
            Uint8 => "uint8",
            Uint16 => "uint16",
            Uint32 => "uint32",
            Uint64 => "uint64",
            Uintptr => "uintptr",
            Float32 => "float32",
            Float64 => "float64",
            String => "string",
            UnsafePointer => "unsafe.Pointer",
            UntypedBool => "untyped bool",
            UntypedInt => "untyped int",
            UntypedFloat => "untyped float",
            UntypedString => "untyped string",
            UntypedNil => "untyped nil",
        }
    }

    /// The type an untyped constant assumes when it must materialize.
    pub fn default_kind(self) -> BasicKind {
        match self {
            BasicKind::UntypedBool => BasicKind::Bool,
            BasicKind::UntypedInt => BasicKind::Int,
            BasicKind::UntypedFloat => BasicKind::Float64,
            BasicKind::UntypedString => BasicKind::String,
            BasicKind::UntypedNil => BasicKind::UnsafePointer,
            other => other,
        }
    }
}

/// Reflection kind ordinals, shared with the runtime's descriptor layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReflectKind {
    Invalid = 0,
    Bool = 1,
    Int = 2,
    Int8 = 3,
    Int16 = 4,
    Int32 = 5,
    Int64 = 6,
    Uint = 7,
    Uint8 = 8,
    Uint16 = 9,
    Uint32 = 10,
    Uint64 = 11,
    Uintptr = 12,
    Float32 = 13,
    Float64 = 14,
    Complex64 = 15,
    Complex128 = 16,
    Array = 17,
    Chan = 18,
    Func = 19,
    Interface = 20,
    Map = 21,
    Ptr = 22,
    Slice = 23,
    String = 24,
    Struct = 25,
    UnsafePointer = 26,
}

/// Registry of named-type definitions. Single-threaded by design; interior
/// mutability lets definitions land after the `Ty` handle exists, which is
/// how declaration cycles are tied off.
#[derive(Default)]
pub struct TypeStore {
    named: RefCell<IndexVec<NamedId, NamedDef>>,
}

impl TypeStore {
    pub fn new() -> TypeStore {
        TypeStore::default()
    }

    /// Declare a named type with a placeholder underlying. The returned `Ty`
    /// may be referenced (e.g. behind pointers) before `define_underlying`.
    pub fn declare_named(&self, name: &str) -> Ty {
        let id = self.named.borrow_mut().push(NamedDef {
            name: Symbol::new(name),
            underlying: Ty::bad(),
            methods: Vec::new(),
        });
        Ty::new(TyKind::Named(id))
    }

    pub fn define_underlying(&self, named: Ty, underlying: Ty) {
        let TyKind::Named(id) = *named.kind() else {
            panic!("define_underlying on non-named type");
        };
        self.named.borrow_mut()[id].underlying = underlying;
    }

    /// Attach a method, keeping the set sorted by name.
    pub fn add_method(&self, named: Ty, method: Method) {
        let TyKind::Named(id) = *named.kind() else {
            panic!("add_method on non-named type");
        };
        let mut defs = self.named.borrow_mut();
        let methods = &mut defs[id].methods;
        let at = methods
            .binary_search_by_key(&method.name, |m| m.name)
            .unwrap_or_else(|i| i);
        methods.insert(at, method);
    }

    pub fn named_name(&self, id: NamedId) -> Symbol {
        self.named.borrow()[id].name
    }

    pub fn named_underlying(&self, id: NamedId) -> Ty {
        self.named.borrow()[id].underlying
    }

    /// Binary search over the sorted method set of a named type.
    pub fn lookup_method(&self, id: NamedId, name: Symbol) -> Option<Method> {
        let defs = self.named.borrow();
        let methods = &defs[id].methods;
        methods
            .binary_search_by_key(&name, |m| m.name)
            .ok()
            .map(|i| methods[i].clone())
    }

    pub fn methods(&self, id: NamedId) -> Vec<Method> {
        self.named.borrow()[id].methods.clone()
    }

    /// Strip all `Named` layers.
    pub fn underlying(&self, ty: Ty) -> Ty {
        let mut ty = ty;
        while let TyKind::Named(id) = *ty.kind() {
            ty = self.named_underlying(id);
        }
        ty
    }

    pub fn deref(&self, ty: Ty) -> Option<Ty> {
        match self.underlying(ty).kind() {
            TyKind::Pointer { base } => Some(*base),
            _ => None,
        }
    }

    /// Two types are identical iff their canonical strings match. Named
    /// types print as their name, so identity of named types is nominal.
    pub fn identical(&self, a: Ty, b: Ty) -> bool {
        a == b || self.canonical(a) == self.canonical(b)
    }

    /// Deterministic, unfolded textual key for a type; the type mapper and
    /// descriptor caches key on it.
    pub fn canonical(&self, ty: Ty) -> String {
        match ty.kind() {
            TyKind::Bad => "<bad>".into(),
            TyKind::Basic(kind) => kind.name().into(),
            TyKind::Array { elem, len } => format!("[{}]{}", len, self.canonical(*elem)),
            TyKind::Slice { elem } => format!("[]{}", self.canonical(*elem)),
            TyKind::Struct { fields } => {
                let body: Vec<String> = fields
                    .iter()
                    .map(|f| {
                        if f.is_embedded() {
                            self.canonical(f.ty)
                        } else {
                            format!("{} {}", f.name, self.canonical(f.ty))
                        }
                    })
                    .collect();
                format!("struct{{{}}}", body.join("; "))
            }
            TyKind::Pointer { base } => format!("*{}", self.canonical(*base)),
            TyKind::Func(sig) => {
                let mut out = String::from("func");
                if let Some(recv) = sig.recv {
                    out.push_str(&format!(" ({})", self.canonical(recv)));
                }
                let params: Vec<String> = sig
                    .params
                    .iter()
                    .enumerate()
                    .map(|(i, p)| {
                        if sig.variadic && i + 1 == sig.params.len() {
                            format!("...{}", self.canonical(*p))
                        } else {
                            self.canonical(*p)
                        }
                    })
                    .collect();
                out.push_str(&format!("({})", params.join(", ")));
                match sig.results.len() {
                    0 => {}
                    1 => out.push_str(&format!(" {}", self.canonical(sig.results[0]))),
                    _ => {
                        let results: Vec<String> =
                            sig.results.iter().map(|r| self.canonical(*r)).collect();
                        out.push_str(&format!(" ({})", results.join(", ")));
                    }
                }
                out
            }
            TyKind::Interface { methods } => {
                let body: Vec<String> = methods
                    .iter()
                    .map(|m| format!("{} {}", m.name, self.canonical(m.sig)))
                    .collect();
                format!("interface{{{}}}", body.join("; "))
            }
            TyKind::Map { key, elem } => {
                format!("map[{}]{}", self.canonical(*key), self.canonical(*elem))
            }
            TyKind::Chan { elem } => format!("chan {}", self.canonical(*elem)),
            TyKind::Named(id) => self.named_name(*id).as_str().into(),
        }
    }

    /// Reflection kind of a type, computed on its underlying.
    pub fn reflect_kind(&self, ty: Ty) -> ReflectKind {
        match self.underlying(ty).kind() {
            TyKind::Bad => ReflectKind::Invalid,
            TyKind::Basic(kind) => match kind.default_kind() {
                BasicKind::Bool => ReflectKind::Bool,
                BasicKind::Int => ReflectKind::Int,
                BasicKind::Int8 => ReflectKind::Int8,
                BasicKind::Int16 => ReflectKind::Int16,
                BasicKind::Int32 => ReflectKind::Int32,
                BasicKind::Int64 => ReflectKind::Int64,
                BasicKind::Uint => ReflectKind::Uint,
                BasicKind::Uint8 => ReflectKind::Uint8,
                BasicKind::Uint16 => ReflectKind::Uint16,
                BasicKind::Uint32 => ReflectKind::Uint32,
                BasicKind::Uint64 => ReflectKind::Uint64,
                BasicKind::Uintptr => ReflectKind::Uintptr,
                BasicKind::Float32 => ReflectKind::Float32,
                BasicKind::Float64 => ReflectKind::Float64,
                BasicKind::String => ReflectKind::String,
                BasicKind::UnsafePointer => ReflectKind::UnsafePointer,
                _ => ReflectKind::Invalid,
            },
            TyKind::Array { .. } => ReflectKind::Array,
            TyKind::Slice { .. } => ReflectKind::Slice,
            TyKind::Struct { .. } => ReflectKind::Struct,
            TyKind::Pointer { .. } => ReflectKind::Ptr,
            TyKind::Func(_) => ReflectKind::Func,
            TyKind::Interface { .. } => ReflectKind::Interface,
            TyKind::Map { .. } => ReflectKind::Map,
            TyKind::Chan { .. } => ReflectKind::Chan,
            TyKind::Named(_) => unreachable!("underlying returned a named type"),
        }
    }

    /// The type an untyped expression assumes when it must materialize.
    pub fn default_type(&self, ty: Ty) -> Ty {
        match ty.kind() {
            TyKind::Basic(kind) if ty.is_untyped() => Ty::basic(kind.default_kind()),
            _ => ty,
        }
    }

    /// The name a field is selected by: its own name, or for embedded
    /// fields the name of the (possibly pointed-to) named type.
    pub fn promoted_name(&self, field: &Field) -> Symbol {
        if !field.is_embedded() {
            return field.name;
        }
        let mut ty = field.ty;
        if let TyKind::Pointer { base } = *ty.kind() {
            ty = base;
        }
        match *ty.kind() {
            TyKind::Named(id) => self.named_name(id),
            _ => field.name,
        }
    }

    /// Position of a (possibly promoted-by-name) direct field in a struct.
    pub fn field_index(&self, fields: &[Field], name: Symbol) -> Option<usize> {
        fields
            .iter()
            .position(|f| self.promoted_name(f) == name && !name.is_empty())
    }
}

impl fmt::Debug for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.kind(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_gives_pointer_identity() {
        let a = Ty::slice(Ty::int());
        let b = Ty::slice(Ty::int());
        assert_eq!(a, b);
        assert_ne!(a, Ty::slice(Ty::int32()));
    }

    #[test]
    fn canonical_strings_unfold_composites() {
        let store = TypeStore::new();
        let ty = Ty::map(Ty::string(), Ty::slice(Ty::pointer(Ty::int())));
        assert_eq!(store.canonical(ty), "map[string][]*int");
    }

    #[test]
    fn canonical_func_includes_variadic_marker() {
        let store = TypeStore::new();
        let sig = FuncSig {
            recv: None,
            params: vec![Ty::string(), Ty::slice(Ty::int())],
            results: vec![Ty::bool_()],
            variadic: true,
        };
        assert_eq!(store.canonical(Ty::func(sig)), "func(string, ...[]int) bool");
    }

    #[test]
    fn underlying_strips_named_layers() {
        let store = TypeStore::new();
        let named = store.declare_named("Celsius");
        store.define_underlying(named, Ty::float64());
        assert_eq!(store.underlying(named), Ty::float64());
        assert_eq!(store.canonical(named), "Celsius");
    }

    #[test]
    fn recursive_named_type_canonicalizes() {
        let store = TypeStore::new();
        let node = store.declare_named("Node");
        let fields = vec![
            Field::named("value", Ty::int()),
            Field::named("next", Ty::pointer(node)),
        ];
        store.define_underlying(node, Ty::strukt(fields));
        assert_eq!(
            store.canonical(store.underlying(node)),
            "struct{value int; next *Node}"
        );
    }

    #[test]
    fn interface_methods_sort_by_name() {
        let store = TypeStore::new();
        let sig = Ty::func(FuncSig::plain(vec![], vec![]));
        let iface = Ty::interface(vec![
            MethodSpec {
                name: Symbol::new("Write"),
                sig,
            },
            MethodSpec {
                name: Symbol::new("Close"),
                sig,
            },
        ]);
        let TyKind::Interface { methods } = iface.kind() else {
            panic!("expected interface");
        };
        assert_eq!(methods[0].name.as_str(), "Close");
        assert_eq!(methods[1].name.as_str(), "Write");
    }

    #[test]
    fn method_lookup_is_by_binary_search() {
        let store = TypeStore::new();
        let named = store.declare_named("Buffer");
        store.define_underlying(named, Ty::strukt(vec![]));
        let sig = Ty::func(FuncSig::plain(vec![], vec![]));
        for name in ["Write", "Close", "Len"] {
            store.add_method(
                named,
                Method {
                    name: Symbol::new(name),
                    sig,
                    func: ObjId::new(0),
                },
            );
        }
        let TyKind::Named(id) = *named.kind() else {
            unreachable!()
        };
        assert!(store.lookup_method(id, Symbol::new("Close")).is_some());
        assert!(store.lookup_method(id, Symbol::new("Len")).is_some());
        assert!(store.lookup_method(id, Symbol::new("Read")).is_none());
    }

    #[test]
    fn reflect_kind_uses_underlying() {
        let store = TypeStore::new();
        let named = store.declare_named("Weight");
        store.define_underlying(named, Ty::pointer(Ty::int()));
        assert_eq!(store.reflect_kind(named), ReflectKind::Ptr);
        assert_eq!(store.reflect_kind(Ty::string()), ReflectKind::String);
    }
}
