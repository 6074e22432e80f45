use crate::schema::{OperatorSignature, SchemaType};

/// Calling convention used to wire a generated function into the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Generic, type-erased registration.
    Boxed,
    /// Statically typed direct call.
    Unboxed,
}

pub fn classify(sig: &OperatorSignature) -> Registration {
    let needs_unboxed = type_needs_unboxed(&sig.return_type)
        || sig.params.iter().any(|p| type_needs_unboxed(&p.ty));
    if needs_unboxed {
        Registration::Unboxed
    } else {
        Registration::Boxed
    }
}

fn type_needs_unboxed(ty: &SchemaType) -> bool {
    let mut ty = ty.desugar();
    if let SchemaType::Array { element, .. } = ty {
        ty = element.desugar();
    }
    !matches!(
        ty,
        SchemaType::Tensor
            | SchemaType::Scalar
            | SchemaType::Bool
            | SchemaType::Int
            | SchemaType::KwArgsSentinel
    )
}
