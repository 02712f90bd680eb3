//! Folder-structure scanner and environment-context injection (spec.md §4.6),
//! grounded on `original_source/nexau_harbor/cli.py`'s `read_full_structure`/
//! `format_structure`/`get_folder_structure`/`get_directory_context_string`/
//! `cmd_run`.

use chrono::Local;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

pub const MAX_ITEMS: usize = 200;
const TRUNCATION_INDICATOR: &str = "...";

pub fn default_ignored_folders() -> HashSet<String> {
    ["node_modules", ".git", "dist", "__pycache__"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// One folder's contents, as discovered by the BFS scan.
#[derive(Debug, Default)]
struct FolderInfo {
    name: String,
    files: Vec<String>,
    sub_folders: Vec<FolderInfo>,
    has_more_files: bool,
    has_more_subfolders: bool,
    is_ignored: bool,
}

struct QueueItem {
    path: PathBuf,
    index_in_parent: usize,
}

/// BFS scan of `root_path`, respecting a global `max_items` budget across the
/// whole tree. Files in a directory are counted before its subdirectories.
fn read_full_structure(root_path: &Path, max_items: usize, ignored_folders: &HashSet<String>) -> Option<FolderInfo> {
    let root_name = root_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| root_path.to_string_lossy().to_string());

    let root = FolderInfo { name: root_name, ..Default::default() };

    // Nodes are addressed by index so the BFS queue can reference a node
    // without holding a second mutable borrow of its parent.
    struct Node {
        info: FolderInfo,
        children: Vec<usize>,
        path: PathBuf,
    }

    let mut nodes: Vec<Node> = vec![Node { info: root, children: Vec::new(), path: root_path.to_path_buf() }];
    let mut queue: VecDeque<usize> = VecDeque::new();
    queue.push_back(0);

    let mut current_item_count = 0usize;
    let mut visited: HashSet<PathBuf> = HashSet::new();

    while let Some(node_idx) = queue.pop_front() {
        let current_path = nodes[node_idx].path.clone();
        if !visited.insert(current_path.clone()) {
            continue;
        }
        if current_item_count >= max_items {
            continue;
        }

        let entries = match std::fs::read_dir(&current_path) {
            Ok(read_dir) => {
                let mut names: Vec<String> = read_dir
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect();
                names.sort();
                names
            }
            Err(_) => {
                if current_path == root_path {
                    return None;
                }
                continue;
            }
        };

        let mut files = Vec::new();
        for entry in &entries {
            let full_path = current_path.join(entry);
            if full_path.is_file() {
                if current_item_count >= max_items {
                    nodes[node_idx].info.has_more_files = true;
                    break;
                }
                files.push(entry.clone());
                current_item_count += 1;
            }
        }
        nodes[node_idx].info.files = files;

        for entry in &entries {
            let full_path = current_path.join(entry);
            if full_path.is_dir() {
                if current_item_count >= max_items {
                    nodes[node_idx].info.has_more_subfolders = true;
                    break;
                }

                if ignored_folders.contains(entry.as_str()) {
                    let child_idx = nodes.len();
                    nodes.push(Node {
                        info: FolderInfo { name: entry.clone(), is_ignored: true, ..Default::default() },
                        children: Vec::new(),
                        path: full_path,
                    });
                    nodes[node_idx].children.push(child_idx);
                    current_item_count += 1;
                    continue;
                }

                let child_idx = nodes.len();
                nodes.push(Node {
                    info: FolderInfo { name: entry.clone(), ..Default::default() },
                    children: Vec::new(),
                    path: full_path.clone(),
                });
                nodes[node_idx].children.push(child_idx);
                current_item_count += 1;
                queue.push_back(child_idx);
            }
        }
    }

    // Fold the arena back into nested `FolderInfo`s, depth-first.
    fn fold(nodes: &mut Vec<Node>, idx: usize) -> FolderInfo {
        let children_idx = std::mem::take(&mut nodes[idx].children);
        let mut info = std::mem::take(&mut nodes[idx].info);
        info.sub_folders = children_idx.into_iter().map(|c| fold(nodes, c)).collect();
        info
    }

    Some(fold(&mut nodes, 0))
}

fn format_structure(
    node: &FolderInfo,
    current_indent: &str,
    is_last_child_of_parent: bool,
    is_root: bool,
    builder: &mut Vec<String>,
) {
    let connector = if is_last_child_of_parent { "└───" } else { "├───" };

    if !is_root || node.is_ignored {
        let suffix = if node.is_ignored { TRUNCATION_INDICATOR } else { "" };
        builder.push(format!("{current_indent}{connector}{}/{suffix}", node.name));
    }

    let indent_for_children = if is_root {
        String::new()
    } else {
        format!("{current_indent}{}", if is_last_child_of_parent { "    " } else { "│   " })
    };

    let file_count = node.files.len();
    for (i, file_name) in node.files.iter().enumerate() {
        let is_last = i == file_count - 1 && node.sub_folders.is_empty() && !node.has_more_subfolders;
        let file_connector = if is_last { "└───" } else { "├───" };
        builder.push(format!("{indent_for_children}{file_connector}{file_name}"));
    }

    if node.has_more_files {
        let is_last = node.sub_folders.is_empty() && !node.has_more_subfolders;
        let file_connector = if is_last { "└───" } else { "├───" };
        builder.push(format!("{indent_for_children}{file_connector}{TRUNCATION_INDICATOR}"));
    }

    let sub_folder_count = node.sub_folders.len();
    for (i, sub_folder) in node.sub_folders.iter().enumerate() {
        let is_last = i == sub_folder_count - 1 && !node.has_more_subfolders;
        format_structure(sub_folder, &indent_for_children, is_last, false, builder);
    }

    if node.has_more_subfolders {
        builder.push(format!("{indent_for_children}└───{TRUNCATION_INDICATOR}"));
    }
}

fn is_truncated(node: &FolderInfo) -> bool {
    node.has_more_files || node.has_more_subfolders || node.is_ignored || node.sub_folders.iter().any(is_truncated)
}

/// Render a directory's structure the way the environment-context block does.
pub fn get_folder_structure(directory: &Path, max_items: usize, ignored_folders: &HashSet<String>) -> String {
    let resolved = match std::fs::canonicalize(directory) {
        Ok(p) => p,
        Err(_) => directory.to_path_buf(),
    };

    let root = match read_full_structure(&resolved, max_items, ignored_folders) {
        Some(root) => root,
        None => return format!("Error: Could not read directory \"{}\". Check path and permissions.", resolved.display()),
    };

    let mut lines = Vec::new();
    format_structure(&root, "", true, true, &mut lines);

    let mut summary = format!("Showing up to {max_items} items (files + folders).");
    if is_truncated(&root) {
        summary.push_str(&format!(
            " Folders or files indicated with {TRUNCATION_INDICATOR} contain more items not shown, \
             were ignored, or the display limit ({max_items} items) was reached."
        ));
    }

    format!("{summary}\n\n{}/\n{}", resolved.display(), lines.join("\n"))
}

/// Build the one-shot environment-context message injected on the first turn
/// when `PawanConfig::inject_environment_context` is set (spec.md §6).
pub fn build_environment_context(agent_name: &str, working_dir: &Path, tmp_dir: &Path) -> String {
    let today = Local::now().format("%A, %B %d, %Y").to_string();
    let os_type = std::env::consts::OS;
    let folder_structure = get_folder_structure(working_dir, MAX_ITEMS, &default_ignored_folders());

    format!(
        "This is the {agent_name}. We are setting up the context for our chat.\n\
         Today's date is {today} (formatted according to the user's locale).\n\
         My operating system is: {os_type}\n\
         The project's temporary directory is: {}\n\
         I'm currently working in the directory: {}\n\
         Here is the folder structure of the current working directories:\n\n\
         {folder_structure}\n\n\
         Reminder: Do not return an empty response when a tool call is required.\n\n\
         My setup is complete. I will provide my first command in the next turn.",
        tmp_dir.display(),
        working_dir.display(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_nested_directory_with_files_before_subfolders() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), "y").unwrap();

        let structure = get_folder_structure(dir.path(), MAX_ITEMS, &default_ignored_folders());
        assert!(structure.contains("a.txt"));
        assert!(structure.contains("sub/"));
        assert!(structure.contains("b.txt"));
    }

    #[test]
    fn ignored_folders_are_marked_truncated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/pkg.json"), "{}").unwrap();

        let structure = get_folder_structure(dir.path(), MAX_ITEMS, &default_ignored_folders());
        assert!(structure.contains("node_modules/..."));
        assert!(!structure.contains("pkg.json"));
    }

    #[test]
    fn budget_truncates_large_directories() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..10 {
            std::fs::write(dir.path().join(format!("file{i}.txt")), "x").unwrap();
        }

        let structure = get_folder_structure(dir.path(), 3, &default_ignored_folders());
        assert!(structure.contains(TRUNCATION_INDICATOR));
        assert!(structure.contains("display limit"));
    }

    #[test]
    fn environment_context_mentions_agent_name_and_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let context = build_environment_context("Pawan", dir.path(), Path::new("/tmp/pawan-abc"));
        assert!(context.contains("This is the Pawan."));
        assert!(context.contains(&dir.path().display().to_string()));
        assert!(context.contains("My setup is complete."));
    }
}
