pub mod extraction;
pub mod structuring;
pub mod policy; // Policy store + token-overlap retrieval
pub mod checklist;
pub mod processor; // Case orchestrator: retrieve → extract → checklist
pub mod assemble; // Packet bundle writer (JSON, Markdown, HTML highlights)
pub mod eval; // Batch evaluation against gold labels
