use super::result::DetectedObject;

/// Depth of nested objects the overlay draws: top-level objects plus their
/// immediate children (e.g. a pose nested inside a person box).
pub const MAX_OBJECT_DEPTH: usize = 2;

/// Pre-order walk over a detection tree, visiting at most `max_depth` levels.
///
/// The visitor receives each object together with its depth (0 for top-level).
/// A parent is always visited before its children, and a parent's children
/// before the next sibling.
pub fn walk_objects<'a, F>(objects: &'a [DetectedObject], max_depth: usize, visit: &mut F)
where
    F: FnMut(&'a DetectedObject, usize),
{
    walk_level(objects, 0, max_depth, visit);
}

fn walk_level<'a, F>(objects: &'a [DetectedObject], depth: usize, max_depth: usize, visit: &mut F)
where
    F: FnMut(&'a DetectedObject, usize),
{
    if depth >= max_depth {
        return;
    }
    for object in objects {
        visit(object, depth);
        walk_level(&object.objects, depth + 1, max_depth, visit);
    }
}
