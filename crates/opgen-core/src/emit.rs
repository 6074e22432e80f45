//! C++ emission for linked operators.

use std::collections::BTreeSet;

use anyhow::Result;

use crate::classify::{classify, Registration};
use crate::diagnostics::{fail, DiagnosticCode};
use crate::graph::{evaluate, EvalContext, NodeId, OpGraph, OutputBinding, Value};
use crate::link::LinkedFunction;
use crate::mapping::Mapping;
use crate::options::GeneratorOptions;
use crate::writer::SourceWriter;

pub fn write_file_prelude(w: &mut SourceWriter, options: &GeneratorOptions, source_sha256: &str) {
    w.writeline(opgen_contracts::GENERATED_BANNER);
    if let Some(provenance) = &options.provenance {
        w.writeline(&format!("// $ {provenance}"));
    }
    w.writeline(&format!("// source sha256: {source_sha256}"));
    w.writeline("");
    for include in &options.includes {
        w.writeline(&format!("#include {include}"));
    }
    w.writeline("");
    for ns in &options.namespaces {
        w.push_namespace(ns);
    }
    if !options.using_declarations.is_empty() {
        w.writeline("");
        for using in &options.using_declarations {
            w.writeline(using);
        }
    }
}

pub fn write_file_postlude(w: &mut SourceWriter) {
    w.pop_namespaces();
}

/// Writes one generated function (or prototype) for `f`.
pub fn write_function(w: &mut SourceWriter, f: &LinkedFunction, mapping: &Mapping) -> Result<()> {
    // Render the body first so a failing operator leaves no half-written text.
    let body = match mapping {
        Mapping::SignatureOnly => None,
        Mapping::Graph(graph) => {
            let mut body = SourceWriter::new();
            body.push_indent();
            write_function_body(&mut body, f, graph)?;
            Some(body.finish())
        }
    };

    w.writeline("");
    w.writeline(&format!("// {}", f.schema));
    write_function_signature(w, f);
    match body {
        None => w.writeline(";"),
        Some(body) => {
            w.writeline(" {");
            w.write_raw(&body);
            w.writeline("}");
        }
    }
    Ok(())
}

fn write_function_signature(w: &mut SourceWriter, f: &LinkedFunction) {
    w.write(&format!("{} {}(", f.decl.return_type, f.decl.name));
    w.push_indent();
    let count = f.decl.params.len();
    for (i, param) in f.decl.params.iter().enumerate() {
        w.writeline("");
        if param.is_kwargs_sentinel() {
            w.write("// ");
        }
        w.write(&param.to_string());
        if i + 1 < count {
            w.write(",");
        }
    }
    w.pop_indent();
    // A commented-out sentinel would swallow the closing parenthesis.
    if f.decl.params.last().is_some_and(|p| p.is_kwargs_sentinel()) {
        w.writeline("");
    }
    w.write(")");
}

fn write_function_body(w: &mut SourceWriter, f: &LinkedFunction, graph: &OpGraph) -> Result<()> {
    let return_alias = f.signature.writable_return_alias();
    let mut in_place_param: Option<&str> = None;

    let ctx = evaluate(graph);

    let log_params: Vec<&str> = f
        .decl
        .params
        .iter()
        .filter_map(|p| p.name.as_deref())
        .collect();
    w.writeline(&format!("ORT_LOG_FN({});", log_params.join(", ")));
    w.writeline("");

    let first_is_tensor = f.signature.params.first().is_some_and(|p| p.ty.is_tensor());
    let first_param = match f.host_param_for_schema(0).and_then(|p| p.name.as_deref()) {
        Some(name) if first_is_tensor => name,
        _ => {
            return fail(
                DiagnosticCode::OPG0400FirstParameterNotTensor,
                format!("first parameter must be an at::Tensor: {}", f.schema),
            )
        }
    };
    w.writeline(&format!("auto& invoker = GetORTInvoker({first_param}.device());"));
    w.writeline("");

    let mut materialized: BTreeSet<&str> = BTreeSet::new();
    let mut literal_count = 0usize;
    let mut return_outputs: Option<NodeId> = None;

    for (index, &id) in ctx.ops().iter().enumerate() {
        let node = graph.node(id);

        // Inputs -> engine values
        let mut args: Vec<String> = Vec::with_capacity(node.inputs.len());
        for input in &node.inputs {
            match input {
                Value::Output(upstream) => {
                    args.push(single_output_ref(f, graph, &ctx, *upstream)?);
                }
                Value::Param(name) => {
                    let Some((_, param)) = f.decl.get_parameter(name) else {
                        return unknown_parameter(f, &node.name, name);
                    };
                    if return_alias.is_some() && f.alias_of(param) == return_alias {
                        in_place_param = param.name.as_deref();
                    }
                    let var = format!("ort_input_{name}");
                    if materialized.insert(name.as_str()) {
                        w.writeline(&format!("auto {var} = create_ort_value(invoker, {name});"));
                    }
                    args.push(var);
                }
                Value::Literal(expr) => {
                    let var = format!("ort_literal_{literal_count}");
                    literal_count += 1;
                    w.writeline(&format!("auto {var} = create_ort_value(invoker, {expr});"));
                    args.push(var);
                }
            }
        }

        // Attributes; absent values are left out of the table.
        let mut attrs: Vec<(&str, String)> = Vec::new();
        for (attr_name, value) in &node.attributes {
            let Some(value) = value else {
                tracing::warn!(
                    op = %f.signature.full_name(),
                    node = %node.name,
                    attribute = %attr_name,
                    "attribute has no value and is omitted"
                );
                continue;
            };
            let expr = match value {
                Value::Param(name) => {
                    if f.decl.get_parameter(name).is_none() {
                        return unknown_parameter(f, &node.name, name);
                    }
                    name.clone()
                }
                Value::Literal(expr) => expr.clone(),
                Value::Output(upstream) => single_output_ref(f, graph, &ctx, *upstream)?,
            };
            attrs.push((attr_name.as_str(), expr));
        }
        let attrs_arg = if attrs.is_empty() {
            "nullptr".to_string()
        } else {
            let var = format!("attrs_{index}");
            w.writeline("");
            w.writeline(&format!("NodeAttributes {var}({});", attrs.len()));
            for (attr_name, expr) in &attrs {
                w.writeline(&format!(
                    "{var}[AttrName::{attr_name}] = create_ort_attribute(AttrName::{attr_name}, {expr});"
                ));
            }
            format!("&{var}")
        };

        let outputs = binding_name(&ctx, id)?;
        w.writeline("");
        w.writeline(&format!("std::vector<OrtValue> {outputs}({});", node.outputs));

        w.writeline("");
        let decl = if index == 0 { "auto " } else { "" };
        w.writeline(&format!("{decl}status = invoker.Invoke(\"{}\", {{", node.name));
        w.push_indent();
        for arg in &args {
            w.writeline(&format!("{arg},"));
        }
        w.pop_indent();
        w.write(&format!("}}, {outputs}, {attrs_arg}"));
        if let Some(domain) = &node.domain {
            w.write(&format!(", {domain}"));
        }
        w.writeline(");");
        w.writeline("");

        w.writeline("if (!status.IsOK())");
        w.push_indent();
        w.writeline("throw std::runtime_error(");
        w.push_indent();
        w.writeline("\"ORT return failure status:\" + status.ErrorMessage());");
        w.pop_indent();
        w.pop_indent();
        w.writeline("");

        return_outputs = Some(id);
    }

    let Some(result) = return_outputs else {
        return fail(
            DiagnosticCode::OPG0901InternalBug,
            format!("op graph produced no instructions: {}", f.schema),
        );
    };
    if graph.node(result).outputs != 1 {
        return multiple_outputs(f, graph.node(result).outputs);
    }
    let result = binding_name(&ctx, result)?;

    if return_alias.is_none() {
        w.writeline("return aten_tensor_from_ort(");
        w.push_indent();
        w.writeline(&format!("std::move({result}[0]),"));
        w.writeline(&format!("{first_param}.options());"));
        w.pop_indent();
        return Ok(());
    }

    let Some(in_place) = in_place_param else {
        return fail(
            DiagnosticCode::OPG0420AliasWithoutInPlaceParameter,
            format!(
                "{:?} has alias info on its return type but no associated parameter",
                f.schema
            ),
        );
    };
    w.writeline(&format!(
        "auto& ort_result_tensor = {result}[0].Get<onnxruntime::Tensor>();"
    ));
    w.writeline("auto* ort_result_data = ort_result_tensor.DataRaw(ort_result_tensor.DataType());");
    w.writeline(&format!(
        "auto* ort_self_tensor = ort_input_{in_place}.GetMutable<onnxruntime::Tensor>();"
    ));
    w.writeline("auto* ort_self_data = ort_self_tensor->MutableDataRaw(ort_self_tensor->DataType());");
    w.writeline("memcpy(ort_self_data, ort_result_data, ort_self_tensor->DataType()->Size() * ort_self_tensor->Shape().Size());");
    w.writeline(&format!("return {in_place};"));
    Ok(())
}

fn binding_name(ctx: &EvalContext, id: NodeId) -> Result<String> {
    match ctx.binding_name(OutputBinding { node: id }) {
        Some(name) => Ok(name.to_string()),
        None => fail(
            DiagnosticCode::OPG0901InternalBug,
            format!("node {} was referenced before evaluation", id.index()),
        ),
    }
}

fn single_output_ref(
    f: &LinkedFunction,
    graph: &OpGraph,
    ctx: &EvalContext,
    upstream: NodeId,
) -> Result<String> {
    let outputs = graph.node(upstream).outputs;
    if outputs != 1 {
        return multiple_outputs(f, outputs);
    }
    Ok(format!("{}[0]", binding_name(ctx, upstream)?))
}

fn multiple_outputs<T>(f: &LinkedFunction, outputs: usize) -> Result<T> {
    fail(
        DiagnosticCode::OPG0410MultipleOutputsUnsupported,
        format!("multiple outputs not supported ({outputs}): {}", f.schema),
    )
}

fn unknown_parameter<T>(f: &LinkedFunction, op: &str, name: &str) -> Result<T> {
    fail(
        DiagnosticCode::OPG0310UnknownParameter,
        format!(
            "{op} refers to `{name}` which is not a parameter of `{}`: {}",
            f.decl.name, f.schema
        ),
    )
}

pub fn write_function_registrations(
    w: &mut SourceWriter,
    options: &GeneratorOptions,
    generated: &[LinkedFunction],
) {
    w.writeline("");
    w.writeline(&format!(
        "TORCH_LIBRARY_IMPL({}, {}, m) {{",
        options.library, options.dispatch_key
    ));
    w.push_indent();
    w.writeline("ORT_LOG_DEBUG << \"ATen init\";");
    for f in generated {
        let op_name = f.signature.full_name();
        match classify(&f.signature) {
            Registration::Unboxed => {
                w.writeline(&format!("m.impl_UNBOXED(\"{op_name}\", {});", f.decl.name))
            }
            Registration::Boxed => {
                w.writeline(&format!("m.impl(\"{op_name}\", TORCH_FN({}));", f.decl.name))
            }
        }
    }
    w.pop_indent();
    w.writeline("}");
    w.writeline("");
}
