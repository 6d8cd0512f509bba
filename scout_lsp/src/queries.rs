//! Symbol queries composed from the client's request primitives.
//!
//! Workspace-wide symbol lookup runs in two hops: find the symbol by name,
//! open the file it lives in, then ask position-based questions about it.

use crate::client::ClangdClient;
use crate::error::ClientError;
use crate::transport::JsonRpcResponse;
use crate::types::{path_to_uri, uri_to_path, Location};
use serde_json::{json, Value};
use std::path::Path;

impl ClangdClient {
    /// Queries workspace symbols by name.
    pub async fn workspace_symbol(&self, query: &str) -> Result<JsonRpcResponse, ClientError> {
        self.send_request("workspace/symbol", json!({ "query": query }))
            .await
    }

    /// Lists the symbols of one document.
    pub async fn document_symbol(&self, path: &Path) -> Result<JsonRpcResponse, ClientError> {
        self.send_request(
            "textDocument/documentSymbol",
            json!({ "textDocument": { "uri": path_to_uri(path) } }),
        )
        .await
    }

    /// Position-based definition query.
    pub async fn document_definition(
        &self,
        uri: &lsp_types::Uri,
        position: lsp_types::Position,
    ) -> Result<Vec<lsp_types::Location>, ClientError> {
        let response = self
            .send_request(
                "textDocument/definition",
                json!({
                    "textDocument": { "uri": uri },
                    "position": position,
                }),
            )
            .await?;
        parse_locations(response, "textDocument/definition")
    }

    /// Position-based references query, declaration included.
    pub async fn document_references(
        &self,
        uri: &lsp_types::Uri,
        position: lsp_types::Position,
    ) -> Result<Vec<lsp_types::Location>, ClientError> {
        let response = self
            .send_request(
                "textDocument/references",
                json!({
                    "textDocument": { "uri": uri },
                    "context": { "includeDeclaration": true },
                    "position": position,
                }),
            )
            .await?;
        parse_locations(response, "textDocument/references")
    }

    /// Resolves a symbol name to its definition locations.
    pub async fn find_symbol_definition(
        &self,
        symbol: &str,
    ) -> Result<Vec<Location>, ClientError> {
        let symbol_loc = self.locate_symbol(symbol).await?;
        self.open_document(uri_to_path(&symbol_loc.uri)).await?;

        let definitions = self
            .document_definition(&symbol_loc.uri, symbol_loc.range.start)
            .await?;
        let definitions = resolve_header_definition(symbol_loc, definitions);
        Ok(definitions.into_iter().map(Location::from).collect())
    }

    /// Resolves a symbol name to every reference in the workspace.
    pub async fn find_symbol_references(
        &self,
        symbol: &str,
    ) -> Result<Vec<Location>, ClientError> {
        let symbol_loc = self.locate_symbol(symbol).await?;
        self.open_document(uri_to_path(&symbol_loc.uri)).await?;

        let references = self
            .document_references(&symbol_loc.uri, symbol_loc.range.start)
            .await?;
        Ok(references.into_iter().map(Location::from).collect())
    }

    /// Finds the first workspace-symbol match for a name.
    async fn locate_symbol(&self, symbol: &str) -> Result<lsp_types::Location, ClientError> {
        let response = self.workspace_symbol(symbol).await?;
        let result = checked_result(response, "workspace/symbol")?;
        let symbols: Vec<lsp_types::SymbolInformation> = serde_json::from_value(result)
            .map_err(|e| {
                ClientError::protocol(format!("unexpected workspace/symbol result: {}", e))
            })?;
        let first = symbols
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::EmptyResult {
                method: "workspace/symbol".to_string(),
            })?;
        Ok(first.location)
    }
}

/// Rejects error responses and missing results.
fn checked_result(response: JsonRpcResponse, method: &str) -> Result<Value, ClientError> {
    if let Some(error) = response.error {
        return Err(ClientError::Server {
            method: method.to_string(),
            message: error.message,
        });
    }
    match response.result {
        Some(value) if !value.is_null() => Ok(value),
        _ => Err(ClientError::EmptyResult {
            method: method.to_string(),
        }),
    }
}

/// Parses a location-list result, rejecting empty answers.
fn parse_locations(
    response: JsonRpcResponse,
    method: &str,
) -> Result<Vec<lsp_types::Location>, ClientError> {
    let result = checked_result(response, method)?;
    let locations: Vec<lsp_types::Location> = serde_json::from_value(result)
        .map_err(|e| ClientError::protocol(format!("unexpected {} result: {}", method, e)))?;
    if locations.is_empty() {
        return Err(ClientError::EmptyResult {
            method: method.to_string(),
        });
    }
    Ok(locations)
}

/// clangd answers a definition query issued from the declaration site; a
/// first hit that lands back in a header means the located symbol was
/// already the definition.
fn resolve_header_definition(
    symbol_loc: lsp_types::Location,
    definitions: Vec<lsp_types::Location>,
) -> Vec<lsp_types::Location> {
    match definitions.first() {
        Some(first) if first.uri.as_str().ends_with(".h") => vec![symbol_loc],
        _ => definitions,
    }
}
