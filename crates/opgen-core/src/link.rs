use anyhow::{Context, Result};

use crate::diagnostics::{fail, DiagnosticCode};
use crate::host::{HostFunctionDecl, HostParam, HostType};
use crate::metadata::OpMetadata;
use crate::schema::{parse_schema, AliasInfo, OperatorSignature, SchemaParam};

/// Schema parameters covered by one host `TensorOptions` parameter
/// (dtype, layout, device, pin_memory).
pub const TENSOR_OPTIONS_WIDTH: usize = 4;

/// A host declaration paired with the operator it implements. Every host
/// parameter carries the indices of the schema parameters it stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedFunction {
    pub decl: HostFunctionDecl,
    pub signature: OperatorSignature,
    /// Schema text exactly as attached to the declaration.
    pub schema: String,
}

impl LinkedFunction {
    pub fn schema_params_of(&self, param: &HostParam) -> Vec<&SchemaParam> {
        param
            .schema_params
            .iter()
            .filter_map(|&i| self.signature.params.get(i))
            .collect()
    }

    /// Alias info of the single schema parameter behind `param`.
    pub fn alias_of(&self, param: &HostParam) -> Option<&AliasInfo> {
        match self.schema_params_of(param).as_slice() {
            [only] => only.ty.alias_info(),
            _ => None,
        }
    }

    /// The host parameter linked to schema parameter `schema_index`.
    pub fn host_param_for_schema(&self, schema_index: usize) -> Option<&HostParam> {
        self.decl
            .params
            .iter()
            .find(|p| p.schema_params.first() == Some(&schema_index))
    }
}

pub fn link(mut decl: HostFunctionDecl, meta: &OpMetadata) -> Result<LinkedFunction> {
    let mut signature = parse_schema(&meta.schema)
        .with_context(|| format!("schema attached to `{}` at {}", decl.name, decl.location))?;
    signature.dispatch = meta.dispatch;
    signature.default = meta.default;

    let sentinel_at = signature.kwargs_sentinel_index();
    let mut linked: Vec<HostParam> = Vec::with_capacity(decl.params.len() + 1);
    let mut host = std::mem::take(&mut decl.params).into_iter();
    let mut cursor = 0usize;
    loop {
        // Host code omits the `*` marker; synthesize it where the schema has one.
        if Some(cursor) == sentinel_at {
            let mut sentinel = HostParam::kwargs_sentinel();
            sentinel.schema_params.push(cursor);
            linked.push(sentinel);
            cursor += 1;
            continue;
        }
        let Some(mut param) = host.next() else {
            break;
        };
        let width = if param.host_type().is_some_and(HostType::is_tensor_options) {
            TENSOR_OPTIONS_WIDTH
        } else {
            1
        };
        if cursor + width > signature.params.len() {
            return fail(
                DiagnosticCode::OPG0200LinkArityMismatch,
                format!(
                    "`{}` parameter {} needs schema parameters {}..{} but {:?} has {}",
                    decl.name,
                    linked.len(),
                    cursor,
                    cursor + width,
                    meta.schema,
                    signature.params.len()
                ),
            );
        }
        param.schema_params.extend(cursor..cursor + width);
        cursor += width;
        linked.push(param);
    }

    if cursor < signature.params.len() {
        tracing::debug!(
            decl = %decl.name,
            unlinked = signature.params.len() - cursor,
            "trailing schema parameters have no host counterpart"
        );
    }

    decl.params = linked;
    Ok(LinkedFunction {
        decl,
        signature,
        schema: meta.schema.clone(),
    })
}
