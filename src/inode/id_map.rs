use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::inode::path::{normalize, parent_of, ROOT};

/// every map instance, including every clone, draws a distinct tag from here
static NEXT_MAP_TAG: AtomicU64 = AtomicU64::new(1);

fn fresh_map_tag() -> u64 {
    NEXT_MAP_TAG.fetch_add(1, Ordering::Relaxed)
}

static NO_PATHS: BTreeSet<PathBuf> = BTreeSet::new();

/// handle to one inode inside one `InodeIdMap`
///
/// the handle carries the tag of the map that minted it. two handles with the
/// same counter value from different maps (or from a map and its clone)
/// compare unequal, and every map operation rejects foreign handles.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InodeId {
    id: u64,
    map: u64,
}

impl InodeId {
    /// counter value within the owning map
    pub fn raw(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for InodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InodeId(#{} in map {})", self.id, self.map)
    }
}

/// path -> inode mapping, represents the directory structure of a filesystem
///
/// all paths are relative, `.` is the root. unlike a real filesystem this
/// does not ban hardlinks to directories (or linking a directory inside
/// itself), and it never resolves symlinks.
///
/// not synchronized: one map belongs to one build session.
#[derive(Debug)]
pub struct InodeIdMap {
    tag: u64,
    description: String,
    next_id: u64,
    path_to_id: HashMap<PathBuf, InodeId>,
    id_to_paths: HashMap<u64, BTreeSet<PathBuf>>,
    // dir/path -> dir/path/child
    id_to_children: HashMap<u64, BTreeSet<PathBuf>>,
}

impl InodeIdMap {
    /// create a map with only the root path bound
    pub fn new() -> Self {
        Self::with_description("")
    }

    /// create a map whose ids render as `description@...`
    pub fn with_description(description: impl Into<String>) -> Self {
        let tag = fresh_map_tag();
        let root = InodeId { id: 0, map: tag };
        let root_path = PathBuf::from(ROOT);

        let mut path_to_id = HashMap::new();
        path_to_id.insert(root_path.clone(), root);
        let mut id_to_paths = HashMap::new();
        id_to_paths.insert(root.id, BTreeSet::from([root_path]));

        Self {
            tag,
            description: description.into(),
            next_id: 1,
            path_to_id,
            id_to_paths,
            id_to_children: HashMap::new(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// id bound to `.`
    pub fn root(&self) -> InodeId {
        InodeId {
            id: 0,
            map: self.tag,
        }
    }

    fn assert_mine(&self, inode_id: InodeId) -> Result<u64> {
        if inode_id.map != self.tag {
            return Err(Error::WrongOwner { id: inode_id.id });
        }
        Ok(inode_id.id)
    }

    /// mint a fresh id with no paths
    ///
    /// ids are never reused, even after every path bound to them is removed.
    pub fn next(&mut self) -> InodeId {
        let inode_id = InodeId {
            id: self.next_id,
            map: self.tag,
        };
        self.next_id += 1;
        inode_id
    }

    /// mint a fresh id and bind it to `path`
    pub fn next_at(&mut self, path: impl AsRef<Path>) -> Result<InodeId> {
        let inode_id = self.next();
        self.add_path(inode_id, path)?;
        Ok(inode_id)
    }

    /// bind `path` to `inode_id`
    ///
    /// the parent of `path` must already be bound. binding a path to the id
    /// it already has is a no-op.
    pub fn add_path(&mut self, inode_id: InodeId, path: impl AsRef<Path>) -> Result<()> {
        self.assert_mine(inode_id)?;
        let path = normalize(path.as_ref())?;

        // `.` has no parent; it can only be rebound to the root itself
        let parent_id = match parent_of(&path) {
            Some(parent) => Some(
                self.path_to_id
                    .get(&parent)
                    .map(|id| id.id)
                    .ok_or_else(|| Error::ParentMissing(path.clone()))?,
            ),
            None => None,
        };

        if let Some(existing) = self.path_to_id.get(&path) {
            if *existing != inode_id {
                return Err(Error::PathCollision {
                    path,
                    new: inode_id.id,
                    existing: existing.id,
                });
            }
            return Ok(());
        }

        let Some(parent_id) = parent_id else {
            // only reachable for `.`, which is always bound
            return Err(Error::RootPath);
        };

        tracing::trace!(id = inode_id.id, path = %path.display(), "add path");
        self.path_to_id.insert(path.clone(), inode_id);
        self.id_to_paths
            .entry(inode_id.id)
            .or_default()
            .insert(path.clone());
        self.id_to_children.entry(parent_id).or_default().insert(path);
        Ok(())
    }

    /// unbind `path`, returning the id it was bound to
    ///
    /// fails if the inode still has children. on any failure the map is
    /// left exactly as it was.
    pub fn remove_path(&mut self, path: impl AsRef<Path>) -> Result<InodeId> {
        let path = normalize(path.as_ref())?;
        let parent = parent_of(&path).ok_or(Error::RootPath)?;

        let inode_id = *self
            .path_to_id
            .get(&path)
            .ok_or_else(|| Error::PathNotFound(path.clone()))?;
        if self
            .id_to_children
            .get(&inode_id.id)
            .is_some_and(|children| !children.is_empty())
        {
            return Err(Error::NodeHasChildren(path));
        }
        let parent_id = self
            .path_to_id
            .get(&parent)
            .map(|id| id.id)
            .ok_or_else(|| Error::PathNotFound(parent.clone()))?;

        // all checks passed, nothing below can fail
        tracing::trace!(id = inode_id.id, path = %path.display(), "remove path");
        self.path_to_id.remove(&path);

        if let Some(paths) = self.id_to_paths.get_mut(&inode_id.id) {
            paths.remove(&path);
            if paths.is_empty() {
                self.id_to_paths.remove(&inode_id.id);
            }
        }

        if let Some(siblings) = self.id_to_children.get_mut(&parent_id) {
            siblings.remove(&path);
            if siblings.is_empty() {
                self.id_to_children.remove(&parent_id);
            }
        }

        Ok(inode_id)
    }

    pub fn get_id(&self, path: impl AsRef<Path>) -> Option<InodeId> {
        let path = normalize(path.as_ref()).ok()?;
        self.path_to_id.get(&path).copied()
    }

    pub fn get_paths(&self, inode_id: InodeId) -> Result<&BTreeSet<PathBuf>> {
        let id = self.assert_mine(inode_id)?;
        Ok(self.id_to_paths.get(&id).unwrap_or(&NO_PATHS))
    }

    pub fn get_children(&self, inode_id: InodeId) -> Result<&BTreeSet<PathBuf>> {
        let id = self.assert_mine(inode_id)?;
        Ok(self.id_to_children.get(&id).unwrap_or(&NO_PATHS))
    }

    /// every bound path with its id, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&Path, InodeId)> {
        self.path_to_id
            .iter()
            .map(|(path, inode_id)| (path.as_path(), *inode_id))
    }

    /// human-readable form of an id: its sorted paths, or `ANON_INODE#n`
    pub fn describe(&self, inode_id: InodeId) -> Result<String> {
        let paths = self.get_paths(inode_id)?;
        let prefix = if self.description.is_empty() {
            String::new()
        } else {
            format!("{}@", self.description)
        };
        if paths.is_empty() {
            return Ok(format!("{}ANON_INODE#{}", prefix, inode_id.id));
        }
        let joined = paths
            .iter()
            .map(|p| p.to_string_lossy())
            .collect::<Vec<_>>()
            .join(",");
        Ok(format!("{}{}", prefix, joined))
    }

    /// clone the map and move `ids` over to the clone in one step
    ///
    /// the returned handles are in the same order as `ids` and are only
    /// valid against the returned map.
    pub fn clone_with_ids(&self, ids: &[InodeId]) -> Result<(Self, Vec<InodeId>)> {
        for inode_id in ids {
            self.assert_mine(*inode_id)?;
        }
        let copy = self.clone();
        let translated = ids
            .iter()
            .map(|inode_id| InodeId {
                id: inode_id.id,
                map: copy.tag,
            })
            .collect();
        Ok((copy, translated))
    }
}

impl Default for InodeIdMap {
    fn default() -> Self {
        Self::new()
    }
}

/// cloning retags the copy; handles from the original do not work on it
impl Clone for InodeIdMap {
    fn clone(&self) -> Self {
        let tag = fresh_map_tag();
        let path_to_id = self
            .path_to_id
            .iter()
            .map(|(path, inode_id)| {
                (
                    path.clone(),
                    InodeId {
                        id: inode_id.id,
                        map: tag,
                    },
                )
            })
            .collect();

        Self {
            tag,
            description: self.description.clone(),
            next_id: self.next_id,
            path_to_id,
            id_to_paths: self.id_to_paths.clone(),
            id_to_children: self.id_to_children.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    type Snapshot = (
        BTreeMap<PathBuf, u64>,
        BTreeMap<u64, BTreeSet<PathBuf>>,
        BTreeMap<u64, BTreeSet<PathBuf>>,
    );

    fn snapshot(map: &InodeIdMap) -> Snapshot {
        (
            map.path_to_id
                .iter()
                .map(|(p, id)| (p.clone(), id.id))
                .collect(),
            map.id_to_paths
                .iter()
                .map(|(id, ps)| (*id, ps.clone()))
                .collect(),
            map.id_to_children
                .iter()
                .map(|(id, ps)| (*id, ps.clone()))
                .collect(),
        )
    }

    fn paths(map: &InodeIdMap, inode_id: InodeId) -> Vec<String> {
        map.get_paths(inode_id)
            .unwrap()
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect()
    }

    fn children(map: &InodeIdMap, inode_id: InodeId) -> Vec<String> {
        map.get_children(inode_id)
            .unwrap()
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect()
    }

    fn assert_consistent(map: &InodeIdMap) {
        for (path, inode_id) in &map.path_to_id {
            assert_eq!(inode_id.map, map.tag);
            let bound = map.id_to_paths.get(&inode_id.id).unwrap();
            assert!(bound.contains(path), "{:?} missing from id_to_paths", path);

            if let Some(parent) = parent_of(path) {
                let parent_id = map.path_to_id.get(&parent).unwrap();
                let siblings = map.id_to_children.get(&parent_id.id).unwrap();
                assert!(siblings.contains(path), "{:?} missing from children", path);
            }
        }
        for (id, bound) in &map.id_to_paths {
            assert!(!bound.is_empty());
            for path in bound {
                assert_eq!(map.path_to_id.get(path).map(|i| i.id), Some(*id));
            }
        }
        for (id, kids) in &map.id_to_children {
            assert!(!kids.is_empty());
            for kid in kids {
                let parent = parent_of(kid).unwrap();
                assert_eq!(map.path_to_id.get(&parent).map(|i| i.id), Some(*id));
            }
        }
    }

    #[test]
    fn test_new_map_has_root() {
        let map = InodeIdMap::new();
        let root = map.get_id(".").unwrap();
        assert_eq!(root, map.root());
        assert_eq!(root.raw(), 0);
        assert_eq!(paths(&map, root), vec!["."]);
        assert!(children(&map, root).is_empty());
        assert_eq!(map.get_id(""), Some(root));
    }

    #[test]
    fn test_add_and_lookup() {
        let mut map = InodeIdMap::new();
        let a = map.next_at("a").unwrap();
        let b = map.next_at("a/b").unwrap();

        assert_eq!(map.get_id("a"), Some(a));
        assert_eq!(map.get_id("./a/./b"), Some(b));
        assert_eq!(map.get_id("a/c"), None);
        assert_eq!(map.get_id("/a"), None);
        assert_eq!(children(&map, map.root()), vec!["a"]);
        assert_eq!(children(&map, a), vec!["a/b"]);
        assert_eq!(paths(&map, b), vec!["a/b"]);
    }

    #[test]
    fn test_parent_must_exist() {
        let mut map = InodeIdMap::new();
        let id0 = map.next();
        let id1 = map.next();

        let result = map.add_path(id1, "x/y");
        assert!(matches!(result, Err(Error::ParentMissing(_))));

        map.add_path(id0, "x").unwrap();
        map.add_path(id1, "x/y").unwrap();
        assert_eq!(map.get_id("x/y"), Some(id1));
    }

    #[test]
    fn test_absolute_path_rejected() {
        let mut map = InodeIdMap::new();
        let id = map.next();
        let result = map.add_path(id, "/etc");
        assert!(matches!(result, Err(Error::AbsolutePath(_))));
    }

    #[test]
    fn test_path_collision() {
        let mut map = InodeIdMap::new();
        let a = map.next_at("a").unwrap();
        let other = map.next();

        let before = snapshot(&map);
        let result = map.add_path(other, "a");
        assert!(matches!(
            result,
            Err(Error::PathCollision { new, existing, .. }) if new == other.raw() && existing == a.raw()
        ));
        assert_eq!(snapshot(&map), before);

        let result = map.add_path(other, ".");
        assert!(matches!(result, Err(Error::PathCollision { .. })));
    }

    #[test]
    fn test_add_same_binding_is_idempotent() {
        let mut map = InodeIdMap::new();
        let a = map.next_at("a").unwrap();
        let before = snapshot(&map);

        map.add_path(a, "a").unwrap();
        map.add_path(a, "./a/").unwrap();
        map.add_path(map.root(), ".").unwrap();
        assert_eq!(snapshot(&map), before);
    }

    #[test]
    fn test_hardlinks_share_an_id() {
        let mut map = InodeIdMap::new();
        let file = map.next_at("f").unwrap();
        map.next_at("d").unwrap();
        map.add_path(file, "d/g").unwrap();

        assert_eq!(paths(&map, file), vec!["d/g", "f"]);
        assert_eq!(map.get_id("d/g"), map.get_id("f"));

        assert_eq!(map.remove_path("f").unwrap(), file);
        assert_eq!(paths(&map, file), vec!["d/g"]);
        map.remove_path("d/g").unwrap();
        assert!(paths(&map, file).is_empty());
        assert!(!map.id_to_paths.contains_key(&file.raw()));
    }

    #[test]
    fn test_remove_prunes_empty_child_sets() {
        let mut map = InodeIdMap::new();
        let a = map.next_at("a").unwrap();
        map.next_at("a/b").unwrap();

        map.remove_path("a/b").unwrap();
        assert!(!map.id_to_children.contains_key(&a.raw()));
        map.remove_path("a").unwrap();
        assert!(map.id_to_children.is_empty());
        assert_eq!(map.path_to_id.len(), 1);
    }

    #[test]
    fn test_remove_with_children_fails_unchanged() {
        let mut map = InodeIdMap::new();
        map.next_at("a").unwrap();
        map.next_at("a/b").unwrap();

        let before = snapshot(&map);
        let result = map.remove_path("a");
        assert!(matches!(result, Err(Error::NodeHasChildren(_))));
        assert_eq!(snapshot(&map), before);
    }

    #[test]
    fn test_remove_unknown_and_root() {
        let mut map = InodeIdMap::new();
        let before = snapshot(&map);

        assert!(matches!(map.remove_path("nope"), Err(Error::PathNotFound(_))));
        assert!(matches!(map.remove_path("."), Err(Error::RootPath)));
        assert!(matches!(map.remove_path("a/.."), Err(Error::RootPath)));
        assert_eq!(snapshot(&map), before);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut map = InodeIdMap::new();
        let a = map.next_at("a").unwrap();
        map.remove_path("a").unwrap();
        let b = map.next_at("a").unwrap();

        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
        assert!(paths(&map, a).is_empty());
    }

    #[test]
    fn test_wrong_owner() {
        let mut first = InodeIdMap::new();
        let mut second = InodeIdMap::new();
        let x = first.next();
        let y = second.next();

        assert_eq!(x.raw(), y.raw());
        assert_ne!(x, y);
        assert_ne!(first.root(), second.root());

        assert!(matches!(second.add_path(x, "a"), Err(Error::WrongOwner { .. })));
        assert!(matches!(second.get_paths(x), Err(Error::WrongOwner { .. })));
        assert!(matches!(second.get_children(x), Err(Error::WrongOwner { .. })));
        assert!(matches!(second.describe(x), Err(Error::WrongOwner { .. })));
        assert!(second.get_id("a").is_none());
    }

    #[test]
    fn test_describe() {
        let mut map = InodeIdMap::with_description("subvol");
        let f = map.next_at("f").unwrap();
        map.add_path(f, "g").unwrap();
        let anon = map.next();

        assert_eq!(map.describe(f).unwrap(), "subvol@f,g");
        assert_eq!(
            map.describe(anon).unwrap(),
            format!("subvol@ANON_INODE#{}", anon.raw())
        );

        let plain = InodeIdMap::new();
        assert_eq!(plain.describe(plain.root()).unwrap(), ".");
    }

    #[test]
    fn test_clone_is_independent() {
        let mut map = InodeIdMap::with_description("orig");
        let d = map.next_at("d").unwrap();
        let f = map.next_at("d/f").unwrap();
        let anon = map.next();

        let (mut copy, ids) = map.clone_with_ids(&[d, f, anon]).unwrap();
        let (cd, cf, canon) = (ids[0], ids[1], ids[2]);

        // same structure, different owner
        assert_eq!(snapshot(&copy), snapshot(&map));
        assert_eq!(copy.description(), "orig");
        assert_eq!(copy.get_id("d/f"), Some(cf));
        assert_ne!(cf, f);
        assert!(matches!(copy.get_paths(f), Err(Error::WrongOwner { .. })));
        assert!(matches!(map.get_paths(cf), Err(Error::WrongOwner { .. })));
        assert_eq!(paths(&copy, cd), vec!["d"]);

        // mutating the clone leaves the original alone
        let before = snapshot(&map);
        copy.add_path(canon, "d/g").unwrap();
        copy.remove_path("d/f").unwrap();
        let fresh = copy.next();
        assert_eq!(fresh.raw(), anon.raw() + 1);
        assert_eq!(snapshot(&map), before);
        assert_eq!(map.get_id("d/f"), Some(f));
        assert_eq!(map.get_id("d/g"), None);

        assert_consistent(&map);
        assert_consistent(&copy);
    }

    #[test]
    fn test_clone_rejects_foreign_ids() {
        let map = InodeIdMap::new();
        let other = InodeIdMap::new();
        let result = map.clone_with_ids(&[other.root()]);
        assert!(matches!(result, Err(Error::WrongOwner { .. })));
    }

    // deliberate deviation from real filesystems: directories may be
    // hardlinked, even into themselves
    #[test]
    fn test_directory_hardlinks_are_permitted() {
        let mut map = InodeIdMap::new();
        let d = map.next_at("d").unwrap();
        map.add_path(d, "e").unwrap();
        map.next_at("e/x").unwrap();

        // the child hangs off the shared inode, so both aliases see it
        assert_eq!(children(&map, d), vec!["e/x"]);
        assert!(matches!(map.remove_path("d"), Err(Error::NodeHasChildren(_))));

        // a directory linked inside itself becomes its own child
        map.add_path(d, "d/self").unwrap();
        assert_eq!(paths(&map, d), vec!["d", "d/self", "e"]);
        assert!(matches!(
            map.remove_path("d/self"),
            Err(Error::NodeHasChildren(_))
        ));
        assert_consistent(&map);
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Mint(usize),
        Add(usize, usize),
        Remove(usize),
    }

    const UNIVERSE: &[&str] = &["a", "b", "a/c", "a/d", "b/e", "a/c/f", "x/y"];

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..UNIVERSE.len()).prop_map(Op::Mint),
            (0..8usize, 0..UNIVERSE.len()).prop_map(|(i, p)| Op::Add(i, p)),
            (0..UNIVERSE.len()).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn prop_mappings_stay_bidirectional(ops in prop::collection::vec(op_strategy(), 0..40)) {
            let mut map = InodeIdMap::new();
            let mut ids = vec![map.root()];

            for op in ops {
                let before = snapshot(&map);
                let result = match op {
                    Op::Mint(p) => map.next_at(UNIVERSE[p]).map(|id| ids.push(id)),
                    Op::Add(i, p) => {
                        let id = ids[i % ids.len()];
                        map.add_path(id, UNIVERSE[p])
                    }
                    Op::Remove(p) => map.remove_path(UNIVERSE[p]).map(|_| ()),
                };
                if result.is_err() {
                    prop_assert_eq!(snapshot(&map), before);
                }
                assert_consistent(&map);
            }
        }
    }
}
