//! Call dispatch.
//!
//! A call through a bare name is tried, in order, as a builtin, a struct
//! constructor and an interface cast. Each attempt either does not apply
//! (`None`), lowers the call, or declines; the last decline is reported if
//! nothing lowers. Calls through `self.<method>` and every other callee
//! shape go to the configured [`CallLowering`](super::CallLowering).

use tracing::debug;

use super::ExprLowerer;
use crate::ast::{Expr, ExprKind};
use crate::error::{Decline, LowerResult, Outcome};
use crate::span::Span;
use crate::types::{BaseKind, Type};

type CallAttempt<'a> = fn(&mut ExprLowerer<'a>, &str, &[Expr], Span) -> LowerResult<Option<Outcome>>;

impl<'a> ExprLowerer<'a> {
    pub(crate) fn lower_call(&mut self, func: &Expr, args: &[Expr], span: Span) -> LowerResult<Outcome> {
        if let Some(name) = func.as_name() {
            return self.lower_named_call(name, args, span);
        }

        let calls = self.calls;
        if let ExprKind::Attribute { value, attr } = &func.kind {
            if value.is_self() {
                debug!(method = %attr, "delegating internal call");
                return Ok(calls.lower_self_call(attr, args, span, self)?.into());
            }
        }
        debug!("delegating external call");
        Ok(calls.lower_external_call(func, args, span, self)?.into())
    }

    fn lower_named_call(&mut self, name: &str, args: &[Expr], span: Span) -> LowerResult<Outcome> {
        let attempts: [CallAttempt<'a>; 3] = [Self::try_builtin, Self::try_struct, Self::try_interface];
        let mut last_decline = None;
        for attempt in attempts {
            match attempt(self, name, args, span)? {
                None => {}
                Some(Outcome::Lowered(node)) => return Ok(node.into()),
                Some(Outcome::Declined(reason)) => {
                    debug!(function = name, %reason, "call interpretation declined");
                    last_decline = Some(reason);
                }
            }
        }
        let reason = last_decline.unwrap_or_else(|| Decline::Other {
            message: format!("unknown function `{name}`"),
        });
        Ok(reason.into())
    }

    fn try_builtin(&mut self, name: &str, args: &[Expr], span: Span) -> LowerResult<Option<Outcome>> {
        let registry = self.builtins;
        let Some(builtin) = registry.get(name) else {
            return Ok(None);
        };
        builtin.build_ir(args, span, self).map(Some)
    }

    /// `Name({member: value, ...})`
    fn try_struct(&mut self, name: &str, args: &[Expr], span: Span) -> LowerResult<Option<Outcome>> {
        if self.env().lookup_struct(name).is_none() {
            return Ok(None);
        }
        match args {
            [Expr { kind: ExprKind::Dict { keys, values }, .. }] => {
                self.lower_struct_literal(name, keys, values, span).map(Some)
            }
            _ => Ok(Some(Decline::BadCallShape { name: name.to_string() }.into())),
        }
    }

    /// `Interface(addr)`: retypes an address as the interface.
    fn try_interface(&mut self, name: &str, args: &[Expr], span: Span) -> LowerResult<Option<Outcome>> {
        if !self.env().is_interface(name) {
            return Ok(None);
        }
        let [arg] = args else {
            return Ok(Some(Decline::BadCallShape { name: name.to_string() }.into()));
        };
        let node = self.lower_expr(arg)?;
        if !node.ty().is_some_and(|t| t.is_base(BaseKind::Address)) {
            return Ok(Some(Decline::BadCallShape { name: name.to_string() }.into()));
        }
        Ok(Some(node.typed(Type::interface(name)).at(span).into()))
    }
}
