//! The typed AST the lowering core consumes.
//!
//! This is the hand-off format from the (external) resolver and type
//! checker: every expression node has an entry in the `ExprId -> Ty` side
//! table, and every leaf that names something carries a resolved `ObjId`.
//! `PackageBuilder` is the construction seam those passes would sit behind;
//! tests and the CLI demos drive it directly.

use crate::sema::{Ty, TypeStore};
use crate::span::Symbol;
use ecow::EcoString;
use index_vec::{IndexVec, define_index_type};
use rustc_hash::FxHashMap;

define_index_type! {
    pub struct ExprId = u32;
}

define_index_type! {
    pub struct ObjId = u32;
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    BasicLit {
        token: LitToken,
        literal: EcoString,
    },
    Ident(ObjId),
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    Paren(ExprId),
    Star(ExprId),
    Index {
        base: ExprId,
        index: ExprId,
    },
    Selector {
        base: ExprId,
        name: Symbol,
        member: ObjId,
    },
    Call {
        callee: ExprId,
        args: Vec<ExprId>,
    },
    TypeAssert {
        operand: ExprId,
        target: Ty,
    },
    /// Elements are positional; field keys and nested element types are the
    /// checker's problem and arrive here already flattened.
    CompositeLit {
        elems: Vec<ExprId>,
    },
}

/// Literal token classes, mirroring the scanner's classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LitToken {
    Int,
    Float,
    Char,
    Str,
    Bool,
    Nil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    AndNot,
    Shl,
    Shr,
    LogAnd,
    LogOr,
    Eql,
    Neq,
    Lss,
    Leq,
    Gtr,
    Geq,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        use BinaryOp::*;
        matches!(self, Eql | Neq | Lss | Leq | Gtr | Geq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `!x`
    Not,
    /// `^x` (bitwise complement)
    Xor,
    /// `&x`
    Addr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjKind {
    Var,
    Fun,
    Typ,
    Con,
    Pkg,
}

/// A resolved program entity. Constant objects carry their value; built-in
/// functions are `Fun` objects with a `Bad` type, callable only by name.
#[derive(Debug, Clone)]
pub struct Object {
    pub kind: ObjKind,
    pub name: Symbol,
    pub ty: Ty,
    pub konst: Option<ConstInit>,
}

#[derive(Debug, Clone)]
pub struct ConstInit {
    pub token: LitToken,
    pub literal: EcoString,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(ExprId),
    /// Local declaration; storage is an entry-block slot.
    Var {
        obj: ObjId,
        init: Option<ExprId>,
    },
    Assign {
        lhs: ExprId,
        rhs: ExprId,
    },
    Return(Vec<ExprId>),
    If {
        cond: ExprId,
        then: Block,
        els: Option<Block>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<ExprId>,
        post: Option<Box<Stmt>>,
        body: Block,
    },
    Block(Block),
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub obj: ObjId,
    pub recv: Option<ObjId>,
    pub params: Vec<ObjId>,
    pub body: Option<Block>,
}

#[derive(Debug, Clone)]
pub struct GlobalVar {
    pub obj: ObjId,
    pub init: Option<ConstInit>,
}

pub struct Package {
    pub name: EcoString,
    pub store: TypeStore,
    pub exprs: IndexVec<ExprId, Expr>,
    pub expr_tys: IndexVec<ExprId, Ty>,
    pub objects: IndexVec<ObjId, Object>,
    pub funcs: Vec<FuncDecl>,
    pub globals: Vec<GlobalVar>,
}

impl Package {
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id]
    }

    /// The checker-assigned type of an expression.
    pub fn ty_of(&self, id: ExprId) -> Ty {
        self.expr_tys[id]
    }

    pub fn object(&self, id: ObjId) -> &Object {
        &self.objects[id]
    }
}

pub struct PackageBuilder {
    pkg: Package,
    builtins: FxHashMap<Symbol, ObjId>,
}

impl PackageBuilder {
    pub fn new(name: &str) -> PackageBuilder {
        PackageBuilder {
            pkg: Package {
                name: name.into(),
                store: TypeStore::new(),
                exprs: IndexVec::new(),
                expr_tys: IndexVec::new(),
                objects: IndexVec::new(),
                funcs: Vec::new(),
                globals: Vec::new(),
            },
            builtins: FxHashMap::default(),
        }
    }

    pub fn store(&self) -> &TypeStore {
        &self.pkg.store
    }

    pub fn finish(self) -> Package {
        self.pkg
    }

    // === objects ===

    fn object(&mut self, kind: ObjKind, name: &str, ty: Ty, konst: Option<ConstInit>) -> ObjId {
        self.pkg.objects.push(Object {
            kind,
            name: Symbol::new(name),
            ty,
            konst,
        })
    }

    pub fn var(&mut self, name: &str, ty: Ty) -> ObjId {
        self.object(ObjKind::Var, name, ty, None)
    }

    pub fn func_obj(&mut self, name: &str, sig: Ty) -> ObjId {
        self.object(ObjKind::Fun, name, sig, None)
    }

    pub fn type_obj(&mut self, name: &str, ty: Ty) -> ObjId {
        self.object(ObjKind::Typ, name, ty, None)
    }

    pub fn pkg_obj(&mut self, name: &str) -> ObjId {
        self.object(ObjKind::Pkg, name, Ty::bad(), None)
    }

    pub fn const_obj(&mut self, name: &str, ty: Ty, token: LitToken, literal: &str) -> ObjId {
        self.object(
            ObjKind::Con,
            name,
            ty,
            Some(ConstInit {
                token,
                literal: literal.into(),
            }),
        )
    }

    pub fn int_const(&mut self, name: &str, value: i64) -> ObjId {
        self.const_obj(name, Ty::untyped_int(), LitToken::Int, &value.to_string())
    }

    /// A built-in function object: `Fun` kind, `Bad` type, dispatched on its
    /// name at call sites.
    pub fn builtin(&mut self, name: &str) -> ObjId {
        let sym = Symbol::new(name);
        if let Some(id) = self.builtins.get(&sym) {
            return *id;
        }
        let id = self.object(ObjKind::Fun, name, Ty::bad(), None);
        self.builtins.insert(sym, id);
        id
    }

    // === expressions ===

    pub fn expr(&mut self, kind: ExprKind, ty: Ty) -> ExprId {
        let id = self.pkg.exprs.push(Expr { kind });
        let tid = self.pkg.expr_tys.push(ty);
        debug_assert_eq!(id, tid);
        id
    }

    pub fn int_lit(&mut self, text: &str) -> ExprId {
        self.expr(
            ExprKind::BasicLit {
                token: LitToken::Int,
                literal: text.into(),
            },
            Ty::untyped_int(),
        )
    }

    pub fn str_lit(&mut self, text: &str) -> ExprId {
        self.expr(
            ExprKind::BasicLit {
                token: LitToken::Str,
                literal: text.into(),
            },
            Ty::untyped_string(),
        )
    }

    pub fn bool_lit(&mut self, value: bool) -> ExprId {
        self.expr(
            ExprKind::BasicLit {
                token: LitToken::Bool,
                literal: if value { "true".into() } else { "false".into() },
            },
            Ty::untyped_bool(),
        )
    }

    pub fn ident(&mut self, obj: ObjId) -> ExprId {
        let ty = self.pkg.objects[obj].ty;
        self.expr(ExprKind::Ident(obj), ty)
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId, ty: Ty) -> ExprId {
        self.expr(ExprKind::Binary { op, lhs, rhs }, ty)
    }

    pub fn unary(&mut self, op: UnaryOp, operand: ExprId, ty: Ty) -> ExprId {
        self.expr(ExprKind::Unary { op, operand }, ty)
    }

    pub fn paren(&mut self, inner: ExprId) -> ExprId {
        let ty = self.pkg.expr_tys[inner];
        self.expr(ExprKind::Paren(inner), ty)
    }

    pub fn star(&mut self, operand: ExprId, ty: Ty) -> ExprId {
        self.expr(ExprKind::Star(operand), ty)
    }

    pub fn index(&mut self, base: ExprId, index: ExprId, ty: Ty) -> ExprId {
        self.expr(ExprKind::Index { base, index }, ty)
    }

    pub fn selector(&mut self, base: ExprId, member: ObjId, ty: Ty) -> ExprId {
        let name = self.pkg.objects[member].name;
        self.expr(ExprKind::Selector { base, name, member }, ty)
    }

    pub fn call(&mut self, callee: ExprId, args: Vec<ExprId>, ty: Ty) -> ExprId {
        self.expr(ExprKind::Call { callee, args }, ty)
    }

    pub fn type_assert(&mut self, operand: ExprId, target: Ty) -> ExprId {
        self.expr(ExprKind::TypeAssert { operand, target }, target)
    }

    pub fn composite(&mut self, elems: Vec<ExprId>, ty: Ty) -> ExprId {
        self.expr(ExprKind::CompositeLit { elems }, ty)
    }

    /// `println(args...)` as an expression statement's call.
    pub fn println_call(&mut self, args: Vec<ExprId>) -> ExprId {
        let obj = self.builtin("println");
        let callee = self.ident(obj);
        self.call(callee, args, Ty::bad())
    }

    // === declarations ===

    pub fn function(
        &mut self,
        obj: ObjId,
        recv: Option<ObjId>,
        params: Vec<ObjId>,
        body: Block,
    ) {
        self.pkg.funcs.push(FuncDecl {
            obj,
            recv,
            params,
            body: Some(body),
        });
    }

    pub fn global(&mut self, obj: ObjId, init: Option<ConstInit>) {
        self.pkg.globals.push(GlobalVar { obj, init });
    }
}
