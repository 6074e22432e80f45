//! End-to-end generation over one translation unit.

use anyhow::Result;

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::emit;
use crate::host::{parse_translation_unit, TranslationUnit};
use crate::link::{link, LinkedFunction};
use crate::mapping::{MappingFile, MappingTable};
use crate::metadata::MetadataTable;
use crate::options::GeneratorOptions;
use crate::util::sha256_hex;
use crate::writer::SourceWriter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutput {
    pub text: String,
    /// Registration names of the emitted functions, in emission order.
    pub generated: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Generator {
    mappings: MappingTable,
    options: GeneratorOptions,
}

impl Generator {
    pub fn new(mappings: MappingTable, options: GeneratorOptions) -> Self {
        Generator { mappings, options }
    }

    /// Builds a generator from a parsed mapping file, using its embedded options
    /// when present.
    pub fn from_mapping_file(file: &MappingFile) -> Result<Self> {
        let options = file.options.clone().unwrap_or_default();
        Ok(Generator::new(file.to_table()?, options))
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut GeneratorOptions {
        &mut self.options
    }

    pub fn mappings(&self) -> &MappingTable {
        &self.mappings
    }

    /// Parses `src`, reads the metadata trailing each declaration, and generates.
    pub fn run(self, src: &str, origin: &str) -> Result<GenerationOutput> {
        let tu = parse_translation_unit(src, origin)?;
        let metadata = MetadataTable::from_trailing_comments(&tu)?;
        self.run_unit(&tu, &metadata, &sha256_hex(src.as_bytes()))
    }

    /// Generates from an already-parsed unit and an explicit metadata table.
    /// Consumes the generator: every mapping must be claimed by a declaration.
    pub fn run_unit(
        mut self,
        tu: &TranslationUnit,
        metadata: &MetadataTable,
        source_sha256: &str,
    ) -> Result<GenerationOutput> {
        let mut w = SourceWriter::new();
        emit::write_file_prelude(&mut w, &self.options, source_sha256);

        let mut generated: Vec<LinkedFunction> = Vec::new();
        for (idx, decl) in tu.decls.iter().enumerate() {
            let Some(meta) = metadata.get(idx) else {
                tracing::debug!(decl = %decl.name, "no operator metadata; skipped");
                continue;
            };

            let mut decl = decl.clone();
            if let Some(prefix) = &self.options.function_name_prefix {
                decl.name = format!("{prefix}{}", decl.name);
            }
            let f = link(decl, meta)?;

            let op_name = f.signature.full_name();
            let Some(mapping) = self.mappings.take(&op_name) else {
                tracing::debug!(op = %op_name, decl = %f.decl.name, "no mapping; skipped");
                continue;
            };

            emit::write_function(&mut w, &f, &mapping)?;
            tracing::debug!(op = %op_name, decl = %f.decl.name, "emitted");
            generated.push(f);
        }

        emit::write_function_registrations(&mut w, &self.options, &generated);
        emit::write_file_postlude(&mut w);

        if !self.mappings.is_empty() {
            let remaining = self.mappings.remaining_names();
            let listed: Vec<String> = remaining.iter().map(|n| format!("'{n}'")).collect();
            let diag = Diagnostic::error(
                DiagnosticCode::OPG0500UnconsumedMapping,
                format!(
                    "operation(s) could not be found for mapping: {}",
                    listed.join(", ")
                ),
            )
            .with_related(remaining);
            return Err(diag.into());
        }

        tracing::info!(
            decls = tu.decls.len(),
            generated = generated.len(),
            "generation finished"
        );
        Ok(GenerationOutput {
            text: w.finish(),
            generated: generated.iter().map(|f| f.signature.full_name()).collect(),
        })
    }
}
