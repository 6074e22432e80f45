use serde::{Deserialize, Serialize};

/// Knobs for the text around generated function bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorOptions {
    /// Prepended to every emitted function name (and its registration).
    pub function_name_prefix: Option<String>,
    /// Free-form provenance line written under the banner, e.g. the command used.
    pub provenance: Option<String>,
    /// `#include` targets, written verbatim (`<a.h>` or `"b.h"`).
    pub includes: Vec<String>,
    /// Namespaces wrapping everything after the includes, outermost first.
    pub namespaces: Vec<String>,
    pub using_declarations: Vec<String>,
    /// First argument of the registration block.
    pub library: String,
    /// Dispatch key of the registration block.
    pub dispatch_key: String,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        GeneratorOptions {
            function_name_prefix: None,
            provenance: None,
            includes: vec![
                "<torch/extension.h>".to_string(),
                "<core/providers/dml/OperatorAuthorHelper/Attributes.h>".to_string(),
                "\"ort_tensor.h\"".to_string(),
                "\"ort_aten.h\"".to_string(),
                "\"ort_log.h\"".to_string(),
            ],
            namespaces: vec!["torch_ort".to_string(), "eager".to_string()],
            using_declarations: vec![
                "using namespace at;".to_string(),
                "using NodeAttributes = onnxruntime::NodeAttributes;".to_string(),
            ],
            library: "aten".to_string(),
            dispatch_key: "ORT".to_string(),
        }
    }
}
