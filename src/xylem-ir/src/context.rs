//! Static (compile-time) context supplied alongside the expression tree.

use std::collections::BTreeMap;

use xylem_core::{QName, SequenceType};

use crate::{ExprId, FunctionId, VarId};

/// A function declared in the query prolog.
#[derive(Debug, Clone)]
pub struct UserFunction {
    pub name: QName,
    pub params: Vec<(VarId, SequenceType)>,
    pub return_type: SequenceType,
    /// Root of the body in the query's arena.
    pub body: ExprId,
}

/// Declared functions, namespace bindings and collation.
#[derive(Debug, Clone)]
pub struct StaticContext {
    pub functions: Vec<UserFunction>,
    pub namespaces: BTreeMap<String, String>,
    pub default_collation: String,
}

impl Default for StaticContext {
    fn default() -> Self {
        let namespaces = [
            ("fn", "http://www.w3.org/2005/xpath-functions"),
            ("op", "http://www.w3.org/2005/xpath-functions/op"),
            ("local", "http://www.w3.org/2005/xquery-local-functions"),
        ]
        .into_iter()
        .map(|(p, u)| (p.to_string(), u.to_string()))
        .collect();

        Self {
            functions: Vec::new(),
            namespaces,
            default_collation: "http://www.w3.org/2005/xpath-functions/collation/codepoint"
                .to_string(),
        }
    }
}

impl StaticContext {
    /// Declare a function and return its id.
    pub fn declare_function(&mut self, function: UserFunction) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(function);
        id
    }

    pub fn function(&self, id: FunctionId) -> Option<&UserFunction> {
        self.functions.get(id.index())
    }

    pub fn lookup_function(&self, name: &QName, arity: usize) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|f| &f.name == name && f.params.len() == arity)
            .map(|i| FunctionId(i as u32))
    }
}

/// A name-resolved query: its arena, main expression and static context.
#[derive(Debug, Clone)]
pub struct QueryModule {
    pub arena: crate::ExprArena,
    pub root: ExprId,
    pub context: StaticContext,
}

impl QueryModule {
    pub fn new(arena: crate::ExprArena, root: ExprId, context: StaticContext) -> Self {
        Self {
            arena,
            root,
            context,
        }
    }

    /// Convenience for queries without declared functions.
    pub fn main_only(arena: crate::ExprArena, root: ExprId) -> Self {
        Self::new(arena, root, StaticContext::default())
    }
}
