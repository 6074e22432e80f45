use opgen_core::host::parse_translation_unit;
use opgen_core::metadata::{MetadataTable, OpMetadata};
use opgen_core::{
    diagnostic_of, source_sha256, DiagnosticCode, GeneratorOptions, Generator, GraphBuilder,
    Mapping, MappingTable, OpGraph, Value,
};

const FOO_DECL: &str = r#"Tensor foo(Tensor x); // {"schema":"foo(Tensor x) -> Tensor","dispatch":"True","default":"False"}
"#;

const RELU_INPLACE_DECL: &str = r#"at::Tensor & relu_(at::Tensor & self); // {"schema":"relu_(Tensor(a!) self) -> Tensor(a!)","dispatch":"True","default":"False"}
"#;

const ADD_INPLACE_DECL: &str = r#"at::Tensor & add_(at::Tensor & self, const at::Tensor & other, const at::Scalar & alpha); // {"schema":"add_.Tensor(Tensor(a!) self, Tensor other, *, Scalar alpha=1) -> Tensor(a!)","dispatch":"True","default":"False"}
"#;

fn unary(op: &str, input: &str) -> OpGraph {
    let mut g = GraphBuilder::new();
    let root = g.op(op, 1).input(Value::param(input)).add();
    g.finish(root).expect("graph")
}

fn generate(src: &str, mappings: MappingTable) -> anyhow::Result<opgen_core::GenerationOutput> {
    Generator::new(mappings, GeneratorOptions::default()).run(src, "decls.h")
}

fn expect_code(result: anyhow::Result<opgen_core::GenerationOutput>, code: DiagnosticCode) {
    let err = result.expect_err("generation must fail");
    let diag = diagnostic_of(&err).unwrap_or_else(|| panic!("no diagnostic in {err:#}"));
    assert_eq!(diag.code, code, "{err:#}");
}

#[test]
fn identity_end_to_end() {
    let mut mappings = MappingTable::new();
    mappings.register("foo", unary("Identity", "x"));

    let out = generate(FOO_DECL, mappings).expect("generate");
    let expected = format!(
        r#"// AUTO-GENERATED CODE! - DO NOT EDIT!
// source sha256: {sha}

#include <torch/extension.h>
#include <core/providers/dml/OperatorAuthorHelper/Attributes.h>
#include "ort_tensor.h"
#include "ort_aten.h"
#include "ort_log.h"

namespace torch_ort {{
namespace eager {{

using namespace at;
using NodeAttributes = onnxruntime::NodeAttributes;

// foo(Tensor x) -> Tensor
Tensor foo(
  Tensor x) {{
  ORT_LOG_FN(x);

  auto& invoker = GetORTInvoker(x.device());

  auto ort_input_x = create_ort_value(invoker, x);

  std::vector<OrtValue> result_0_Identity(1);

  auto status = invoker.Invoke("Identity", {{
    ort_input_x,
  }}, result_0_Identity, nullptr);

  if (!status.IsOK())
    throw std::runtime_error(
      "ORT return failure status:" + status.ErrorMessage());

  return aten_tensor_from_ort(
    std::move(result_0_Identity[0]),
    x.options());
}}

TORCH_LIBRARY_IMPL(aten, ORT, m) {{
  ORT_LOG_DEBUG << "ATen init";
  m.impl("foo", TORCH_FN(foo));
}}

}} // namespace eager
}} // namespace torch_ort
"#,
        sha = source_sha256(FOO_DECL.as_bytes())
    );
    assert_eq!(out.text, expected);
    assert_eq!(out.generated, vec!["foo".to_string()]);
}

#[test]
fn output_is_deterministic() {
    let build = || {
        let mut mappings = MappingTable::new();
        mappings.register("foo", unary("Identity", "x"));
        generate(FOO_DECL, mappings).expect("generate").text
    };
    assert_eq!(build(), build());
}

#[test]
fn unconsumed_mappings_are_all_reported() {
    let mut mappings = MappingTable::new();
    mappings.register("foo", unary("Identity", "x"));
    mappings.register("bar", unary("Neg", "x"));
    mappings.register("baz", Mapping::SignatureOnly);

    let err = generate(FOO_DECL, mappings).expect_err("must fail");
    let diag = diagnostic_of(&err).expect("diagnostic");
    assert_eq!(diag.code, DiagnosticCode::OPG0500UnconsumedMapping);
    assert_eq!(diag.related, vec!["bar".to_string(), "baz".to_string()]);
    assert!(diag.message.contains("'bar', 'baz'"), "{}", diag.message);
    assert!(!diag.message.contains("'foo'"), "{}", diag.message);
}

#[test]
fn in_place_return_copies_into_aliased_parameter() {
    let mut mappings = MappingTable::new();
    mappings.register("relu_", unary("Relu", "self"));

    let out = generate(RELU_INPLACE_DECL, mappings).expect("generate");
    assert!(out.text.contains(
        "auto* ort_self_tensor = ort_input_self.GetMutable<onnxruntime::Tensor>();"
    ));
    assert!(out.text.contains("memcpy(ort_self_data, ort_result_data,"));
    assert!(out.text.contains("  return self;\n}\n"), "{}", out.text);
    assert!(!out.text.contains("aten_tensor_from_ort"));
}

#[test]
fn alias_without_in_place_parameter_fails() {
    let mut mappings = MappingTable::new();
    mappings.register("add_.Tensor", unary("Identity", "other"));
    expect_code(
        generate(ADD_INPLACE_DECL, mappings),
        DiagnosticCode::OPG0420AliasWithoutInPlaceParameter,
    );
}

#[test]
fn kwargs_sentinel_is_commented_out() {
    let mut g = GraphBuilder::new();
    let mul = g
        .op("Mul", 1)
        .input(Value::param("alpha"))
        .input(Value::param("other"))
        .add();
    let add = g
        .op("Add", 1)
        .input(Value::param("self"))
        .input(mul)
        .add();
    let mut mappings = MappingTable::new();
    mappings.register("add_.Tensor", g.finish(add).expect("graph"));

    let out = generate(ADD_INPLACE_DECL, mappings).expect("generate");
    assert!(
        out.text.contains(
            "at::Tensor & add_(\n  at::Tensor & self,\n  const at::Tensor & other,\n  // *,\n  const at::Scalar & alpha) {\n"
        ),
        "{}",
        out.text
    );
    assert!(out.text.contains("ORT_LOG_FN(self, other, alpha);"));
    assert!(out.text.contains("  status = invoker.Invoke(\"Add\", {\n    ort_input_self,\n    result_0_Mul[0],\n  }, result_1_Add, nullptr);"));
    assert!(out.text.contains("m.impl(\"add_.Tensor\", TORCH_FN(add_));"));
}

#[test]
fn trailing_sentinel_keeps_closing_paren() {
    let src = r#"at::Tensor foo(const at::Tensor & self); // {"schema":"foo(Tensor self, *) -> Tensor","dispatch":"False","default":"False"}
"#;
    let mut mappings = MappingTable::new();
    mappings.register("foo", Mapping::SignatureOnly);

    let out = generate(src, mappings).expect("generate");
    assert!(
        out.text.contains("at::Tensor foo(\n  const at::Tensor & self,\n  // *\n);\n"),
        "{}",
        out.text
    );
}

#[test]
fn signature_only_emits_prototype() {
    let mut mappings = MappingTable::new();
    mappings.register("foo", Mapping::SignatureOnly);

    let out = generate(FOO_DECL, mappings).expect("generate");
    assert!(out.text.contains("// foo(Tensor x) -> Tensor\nTensor foo(\n  Tensor x);\n"));
    assert!(!out.text.contains("invoker"));
    assert!(out.text.contains("m.impl(\"foo\", TORCH_FN(foo));"));
}

#[test]
fn declarations_without_metadata_are_skipped() {
    let src = format!("int helper(int a);\n// leading comment only\nvoid other();\n{FOO_DECL}");
    let mut mappings = MappingTable::new();
    mappings.register("foo", unary("Identity", "x"));

    let out = generate(&src, mappings).expect("generate");
    assert_eq!(out.generated, vec!["foo".to_string()]);
    assert!(!out.text.contains("helper"));
}

#[test]
fn unmapped_declarations_are_linked_then_skipped() {
    let src = format!(
        "{FOO_DECL}{}",
        r#"Tensor bar(Tensor x); // {"schema":"bar(Tensor x) -> Tensor","dispatch":"True","default":"True"}
"#
    );
    let mut mappings = MappingTable::new();
    mappings.register("foo", unary("Identity", "x"));
    let out = generate(&src, mappings).expect("generate");
    assert_eq!(out.generated, vec!["foo".to_string()]);

    let broken = format!("{FOO_DECL}Tensor bar(Tensor x); // {{\"schema\":\"bar(\"}}\n");
    let mut mappings = MappingTable::new();
    mappings.register("foo", unary("Identity", "x"));
    expect_code(generate(&broken, mappings), DiagnosticCode::OPG0100MetadataError);
}

#[test]
fn unmapped_array_parameter_does_not_block_generation() {
    let src = format!(
        "{FOO_DECL}{}",
        r#"::std::tuple<at::Tensor,at::Tensor> nbb(const at::Tensor & grad, ::std::array<bool,2> output_mask); // {"schema":"nbb(Tensor grad, bool[2] output_mask) -> (Tensor, Tensor)","dispatch":"True","default":"False"}
"#
    );
    let mut mappings = MappingTable::new();
    mappings.register("foo", unary("Identity", "x"));

    let out = generate(&src, mappings).expect("generate");
    assert_eq!(out.generated, vec!["foo".to_string()]);
    assert!(!out.text.contains("nbb"));
}

#[test]
fn unmapped_wildcard_alias_does_not_block_generation() {
    let src = format!(
        "{FOO_DECL}{}",
        r#"::std::vector<at::Tensor> unbind(const at::Tensor & self, int64_t dim); // {"schema":"unbind.int(Tensor(a -> *) self, int dim=0) -> Tensor(a)[]","dispatch":"False","default":"True"}
"#
    );
    let mut mappings = MappingTable::new();
    mappings.register("foo", unary("Identity", "x"));

    let out = generate(&src, mappings).expect("generate");
    assert_eq!(out.generated, vec!["foo".to_string()]);
}

const HEADER_EXCERPT: &str = r#"#pragma once

// @generated from tools/autograd/templates/RegistrationDeclarations.h

#include <c10/core/Scalar.h>
#include <ATen/Tensor.h>

at::Tensor & abs_(at::Tensor & self); // {"schema": "aten::abs_(Tensor(a!) self) -> Tensor(a!)", "dispatch": "True", "default": "True"}
at::Tensor add(const at::Tensor & self, const at::Tensor & other, const at::Scalar & alpha); // {"schema": "aten::add.Tensor(Tensor self, Tensor other, *, Scalar alpha=1) -> Tensor", "dispatch": "True", "default": "False"}
at::Tensor & add_(at::Tensor & self, const at::Tensor & other, const at::Scalar & alpha); // {"schema": "aten::add_.Tensor(Tensor(a!) self, Tensor other, *, Scalar alpha=1) -> Tensor(a!)", "dispatch": "True", "default": "False"}
at::Tensor empty(at::IntArrayRef size, at::TensorOptions options, c10::optional<at::MemoryFormat> memory_format); // {"schema": "aten::empty.memory_format(int[] size, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None, MemoryFormat? memory_format=None) -> Tensor", "dispatch": "True", "default": "False"}
::std::tuple<at::Tensor,at::Tensor,at::Tensor> native_batch_norm_backward(const at::Tensor & grad_out, const at::Tensor & input, const c10::optional<at::Tensor> & weight, const c10::optional<at::Tensor> & running_mean, const c10::optional<at::Tensor> & running_var, const c10::optional<at::Tensor> & save_mean, const c10::optional<at::Tensor> & save_invstd, bool train, double eps, ::std::array<bool,3> output_mask); // {"schema": "aten::native_batch_norm_backward(Tensor grad_out, Tensor input, Tensor? weight, Tensor? running_mean, Tensor? running_var, Tensor? save_mean, Tensor? save_invstd, bool train, float eps, bool[3] output_mask) -> (Tensor, Tensor, Tensor)", "dispatch": "True", "default": "False"}
::std::vector<at::Tensor> unbind(const at::Tensor & self, int64_t dim); // {"schema": "aten::unbind.int(Tensor(a -> *) self, int dim=0) -> Tensor(a)[]", "dispatch": "False", "default": "True"}
int64_t size(const at::Tensor & self, int64_t dim); // {"schema": "aten::size.int(Tensor self, int dim) -> int", "dispatch": "False", "default": "True"}
"#;

#[test]
fn header_excerpt_generates_only_the_mapped_operator() {
    let mut mappings = MappingTable::new();
    let mut g = GraphBuilder::new();
    let root = g
        .op("Add", 1)
        .input(Value::param("self"))
        .input(Value::param("other"))
        .add();
    mappings.register("aten::add.Tensor", g.finish(root).expect("graph"));

    let out = generate(HEADER_EXCERPT, mappings).expect("generate");
    assert_eq!(out.generated, vec!["aten::add.Tensor".to_string()]);
    assert!(out
        .text
        .contains("// aten::add.Tensor(Tensor self, Tensor other, *, Scalar alpha=1) -> Tensor\n"));
    assert!(out.text.contains("m.impl(\"aten::add.Tensor\", TORCH_FN(add));"));
    for skipped in ["abs_", "empty", "native_batch_norm_backward", "unbind", "TORCH_FN(add_)"] {
        assert!(!out.text.contains(skipped), "{skipped} was emitted");
    }
}

#[test]
fn later_duplicate_declarations_are_skipped() {
    let src = format!("{FOO_DECL}{FOO_DECL}");
    let mut mappings = MappingTable::new();
    mappings.register("foo", unary("Identity", "x"));

    let out = generate(&src, mappings).expect("generate");
    assert_eq!(out.generated, vec!["foo".to_string()]);
    assert_eq!(out.text.matches("// foo(Tensor x) -> Tensor").count(), 1);
}

#[test]
fn first_parameter_must_be_a_tensor() {
    let src = r#"at::Tensor arange(const at::Scalar & end); // {"schema":"arange(Scalar end) -> Tensor","dispatch":"True","default":"False"}
"#;
    let mut mappings = MappingTable::new();
    mappings.register("arange", unary("Range", "end"));
    expect_code(
        generate(src, mappings),
        DiagnosticCode::OPG0400FirstParameterNotTensor,
    );
}

#[test]
fn multi_output_results_are_rejected() {
    let mut g = GraphBuilder::new();
    let split = g.op("Split", 2).input(Value::param("x")).add();
    let mut mappings = MappingTable::new();
    mappings.register("foo", g.finish(split).expect("graph"));
    expect_code(
        generate(FOO_DECL, mappings),
        DiagnosticCode::OPG0410MultipleOutputsUnsupported,
    );

    let mut g = GraphBuilder::new();
    let split = g.op("Split", 2).input(Value::param("x")).add();
    let relu = g.op("Relu", 1).input(split).add();
    let mut mappings = MappingTable::new();
    mappings.register("foo", g.finish(relu).expect("graph"));
    expect_code(
        generate(FOO_DECL, mappings),
        DiagnosticCode::OPG0410MultipleOutputsUnsupported,
    );
}

#[test]
fn unknown_parameter_reference_fails() {
    let mut mappings = MappingTable::new();
    mappings.register("foo", unary("Identity", "y"));
    expect_code(
        generate(FOO_DECL, mappings),
        DiagnosticCode::OPG0310UnknownParameter,
    );
}

#[test]
fn null_attributes_are_omitted() {
    let src = r#"at::Tensor softmax(const at::Tensor & self, int64_t dim); // {"schema":"softmax.int(Tensor self, int dim) -> Tensor","dispatch":"True","default":"False"}
"#;
    let mut g = GraphBuilder::new();
    let root = g
        .op("Softmax", 1)
        .input(Value::param("self"))
        .attr("axis", Value::param("dim"))
        .attr("unused", None::<Value>)
        .domain("kMSDomain")
        .add();
    let mut mappings = MappingTable::new();
    mappings.register("softmax.int", g.finish(root).expect("graph"));

    let out = generate(src, mappings).expect("generate");
    assert!(out.text.contains(
        "  NodeAttributes attrs_0(1);\n  attrs_0[AttrName::axis] = create_ort_attribute(AttrName::axis, dim);\n"
    ));
    assert!(!out.text.contains("unused"));
    assert!(out.text.contains("}, result_0_Softmax, &attrs_0, kMSDomain);"));
}

#[test]
fn parameters_are_materialized_once_and_literals_inline() {
    let mut g = GraphBuilder::new();
    let a = g
        .op("Mul", 1)
        .input(Value::param("x"))
        .input(Value::param("x"))
        .add();
    let b = g
        .op("Add", 1)
        .input(a)
        .input(Value::literal("at::Scalar(1)"))
        .add();
    let mut mappings = MappingTable::new();
    mappings.register("foo", g.finish(b).expect("graph"));

    let out = generate(FOO_DECL, mappings).expect("generate");
    assert_eq!(out.text.matches("auto ort_input_x = ").count(), 1);
    assert!(out.text.contains("auto ort_literal_0 = create_ort_value(invoker, at::Scalar(1));"));
    assert_eq!(out.text.matches("auto status = ").count(), 1);
    assert_eq!(out.text.matches("status = invoker.Invoke").count(), 2);
}

#[test]
fn prefix_applies_to_function_and_registration() {
    let mut mappings = MappingTable::new();
    mappings.register("foo", unary("Identity", "x"));
    let mut generator = Generator::new(mappings, GeneratorOptions::default());
    generator.options_mut().function_name_prefix = Some("ort_".to_string());

    let out = generator.run(FOO_DECL, "decls.h").expect("generate");
    assert!(out.text.contains("Tensor ort_foo(\n"));
    assert!(out.text.contains("m.impl(\"foo\", TORCH_FN(ort_foo));"));
}

#[test]
fn unboxed_registration_for_optional_parameters() {
    let src = r#"at::Tensor sum(const at::Tensor & self, c10::optional<at::ScalarType> dtype); // {"schema":"sum(Tensor self, *, ScalarType? dtype=None) -> Tensor","dispatch":"True","default":"False"}
"#;
    let mut mappings = MappingTable::new();
    mappings.register("sum", unary("ReduceSum", "self"));

    let out = generate(src, mappings).expect("generate");
    assert!(out.text.contains("m.impl_UNBOXED(\"sum\", sum);"), "{}", out.text);
}

#[test]
fn metadata_table_can_be_supplied_directly() {
    let src = "Tensor foo(Tensor x);\n";
    let tu = parse_translation_unit(src, "decls.h").expect("parse");
    let mut metadata = MetadataTable::new();
    metadata.insert(
        0,
        OpMetadata {
            schema: "foo(Tensor x) -> Tensor".to_string(),
            dispatch: true,
            default: false,
        },
    );
    let mut mappings = MappingTable::new();
    mappings.register("foo", unary("Identity", "x"));

    let out = Generator::new(mappings, GeneratorOptions::default())
        .run_unit(&tu, &metadata, &source_sha256(src.as_bytes()))
        .expect("generate");
    assert_eq!(out.generated, vec!["foo".to_string()]);
}

#[test]
fn custom_options_shape_the_prelude() {
    let options = GeneratorOptions {
        provenance: Some("opgen gen --decls decls.h".to_string()),
        includes: vec!["\"kernels.h\"".to_string()],
        namespaces: vec!["backend".to_string()],
        using_declarations: Vec::new(),
        library: "aten".to_string(),
        dispatch_key: "PrivateUse1".to_string(),
        ..GeneratorOptions::default()
    };
    let mut mappings = MappingTable::new();
    mappings.register("foo", unary("Identity", "x"));

    let out = Generator::new(mappings, options)
        .run(FOO_DECL, "decls.h")
        .expect("generate");
    assert!(out
        .text
        .starts_with("// AUTO-GENERATED CODE! - DO NOT EDIT!\n// $ opgen gen --decls decls.h\n"));
    assert!(out.text.contains("#include \"kernels.h\"\n\nnamespace backend {\n\n// foo"));
    assert!(out.text.contains("TORCH_LIBRARY_IMPL(aten, PrivateUse1, m) {"));
    assert!(out.text.ends_with("}\n\n} // namespace backend\n"));
}
