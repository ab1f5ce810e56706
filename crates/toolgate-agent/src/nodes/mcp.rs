//! Nodes backed by tools on external tool servers.
//!
//! Each definition names its owning server and the credential type it needs;
//! the binding names the remote tool. Arguments are forwarded unchanged.

use toolgate_core::{
    CatalogEntry, NodeBinding, NodeCategory, NodeDefinition, NodeInput, NodeInputType, NodeOutput,
};

pub const SLACK_SEND_MESSAGE: &str = "slack_send_message";
pub const GITHUB_CREATE_ISSUE: &str = "github_create_issue";
pub const FILESYSTEM_READ_FILE: &str = "filesystem_read_file";
pub const NOTION_SEARCH: &str = "notion_search";

fn bind(definition: NodeDefinition, tool: &str) -> CatalogEntry {
    CatalogEntry {
        definition,
        binding: NodeBinding::Mcp {
            tool: tool.to_string(),
        },
    }
}

pub fn slack_send_message() -> CatalogEntry {
    let definition = NodeDefinition::new(
        SLACK_SEND_MESSAGE,
        "Slack Send Message",
        "Send a message to a Slack channel",
        NodeCategory::Mcp,
    )
    .with_credential_type("slack_oauth")
    .with_server("slack")
    .with_input(
        NodeInput::new("channel", NodeInputType::String)
            .describe("Channel name or ID (e.g. #general)"),
    )
    .with_input(NodeInput::new("message", NodeInputType::String).describe("Message text"))
    .with_output(NodeOutput::new("success", NodeInputType::Boolean))
    .with_output(NodeOutput::new("channel", NodeInputType::String))
    .with_output(NodeOutput::new("ts", NodeInputType::String))
    .with_tags(["slack", "messaging", "communication"]);

    bind(definition, "send_message")
}

pub fn github_create_issue() -> CatalogEntry {
    let definition = NodeDefinition::new(
        GITHUB_CREATE_ISSUE,
        "GitHub Create Issue",
        "Create an issue in a GitHub repository",
        NodeCategory::Mcp,
    )
    .with_credential_type("github_token")
    .with_server("github")
    .with_input(NodeInput::new("repo", NodeInputType::String).describe("Repository (owner/name)"))
    .with_input(NodeInput::new("title", NodeInputType::String).describe("Issue title"))
    .with_input(
        NodeInput::new("body", NodeInputType::String)
            .describe("Issue body (markdown)")
            .optional(),
    )
    .with_input(
        NodeInput::new("labels", NodeInputType::Array)
            .describe("Labels to apply")
            .optional(),
    )
    .with_output(NodeOutput::new("success", NodeInputType::Boolean))
    .with_output(NodeOutput::new("issue_number", NodeInputType::Number))
    .with_output(NodeOutput::new("issue_url", NodeInputType::String))
    .with_tags(["github", "issues", "project-management"]);

    bind(definition, "create_issue")
}

pub fn filesystem_read_file() -> CatalogEntry {
    let definition = NodeDefinition::new(
        FILESYSTEM_READ_FILE,
        "Read File",
        "Read contents of a file",
        NodeCategory::Mcp,
    )
    .with_server("filesystem")
    .with_input(NodeInput::new("path", NodeInputType::String).describe("Path to the file to read"))
    .with_output(NodeOutput::new("content", NodeInputType::String))
    .with_tags(["filesystem", "file", "read"]);

    bind(definition, "read_file")
}

pub fn notion_search() -> CatalogEntry {
    let definition = NodeDefinition::new(
        NOTION_SEARCH,
        "Notion Search",
        "Search for pages and databases in Notion",
        NodeCategory::Mcp,
    )
    .with_credential_type("notion_oauth")
    .with_server("notion")
    .with_input(NodeInput::new("query", NodeInputType::String).describe("Search text"))
    .with_input(
        NodeInput::new("filter", NodeInputType::Json)
            .describe(r#"Restrict results, e.g. {"value": "page", "property": "object"}"#)
            .optional(),
    )
    .with_output(NodeOutput::new("results", NodeInputType::Array))
    .with_tags(["notion", "search", "knowledge"]);

    bind(definition, "API-post-search")
}

/// All tool-server nodes shipped with toolgate.
pub fn entries() -> Vec<CatalogEntry> {
    vec![
        slack_send_message(),
        github_create_issue(),
        filesystem_read_file(),
        notion_search(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_entry_names_a_server_and_tool() {
        for entry in entries() {
            assert_eq!(entry.definition.category, NodeCategory::Mcp);
            assert!(entry.definition.mcp_server_id.is_some(), "{}", entry.definition.name);
            assert!(matches!(entry.binding, NodeBinding::Mcp { ref tool } if !tool.is_empty()));
        }
    }

    #[test]
    fn test_filesystem_needs_no_credential() {
        assert!(filesystem_read_file().definition.credential_type.is_none());
        assert_eq!(
            slack_send_message().definition.credential_type.as_deref(),
            Some("slack_oauth")
        );
    }
}
