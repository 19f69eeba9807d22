//! # Ordering/Visibility Manager
//!
//! Z-order and list-level operations on a [`Scene`].
//!
//! Every operation that changes order renumbers all slots, the background
//! pseudo-layer included, to a dense `0..N` sequence in paint order so ties
//! never accumulate. The background may be reordered but never deleted,
//! duplicated, hidden, locked or renamed.

use crate::error::OrderingError;
use crate::layer::{Layer, LayerId};
use crate::scene::Scene;

/// Offset applied to duplicates, in reference-width units on both axes.
pub const DUPLICATE_OFFSET: f32 = 20.0;

/// Slot ids in back-to-front paint order.
fn slots(scene: &Scene) -> Vec<LayerId> {
    scene.paint_order().iter().map(|item| item.id()).collect()
}

fn apply_order(scene: &mut Scene, order: &[LayerId]) {
    for (z, id) in order.iter().enumerate() {
        let z = z as i32;
        if id.is_background() {
            scene.background.z_index = z;
        } else if let Some(layer) = scene.layers.iter_mut().find(|l| l.id == *id) {
            layer.z_index = z;
        }
    }
}

/// Renumbers every slot densely without changing the paint order.
pub fn renumber(scene: &mut Scene) {
    let order = slots(scene);
    apply_order(scene, &order);
}

fn position_of(order: &[LayerId], id: LayerId) -> Result<usize, OrderingError> {
    order
        .iter()
        .position(|slot| *slot == id)
        .ok_or(OrderingError::NotFound(id))
}

fn layer_mut(scene: &mut Scene, id: LayerId) -> Result<&mut Layer, OrderingError> {
    scene
        .layers
        .iter_mut()
        .find(|l| l.id == id)
        .ok_or(OrderingError::NotFound(id))
}

fn refuse_background(id: LayerId, action: &'static str) -> Result<(), OrderingError> {
    if id.is_background() {
        return Err(OrderingError::BackgroundProtected(action));
    }
    Ok(())
}

/// Swaps `id` with the slot painted directly above it. No-op at the top.
pub fn move_up(scene: &mut Scene, id: LayerId) -> Result<(), OrderingError> {
    let mut order = slots(scene);
    let i = position_of(&order, id)?;
    if i + 1 < order.len() {
        order.swap(i, i + 1);
    }
    apply_order(scene, &order);
    Ok(())
}

/// Swaps `id` with the slot painted directly below it. No-op at the bottom.
pub fn move_down(scene: &mut Scene, id: LayerId) -> Result<(), OrderingError> {
    let mut order = slots(scene);
    let i = position_of(&order, id)?;
    if i > 0 {
        order.swap(i, i - 1);
    }
    apply_order(scene, &order);
    Ok(())
}

/// Moves `id` to `index` in back-to-front order (clamped), as when dragging
/// an entry within the layer list.
pub fn reorder(scene: &mut Scene, id: LayerId, index: usize) -> Result<(), OrderingError> {
    let mut order = slots(scene);
    let from = position_of(&order, id)?;
    let slot = order.remove(from);
    let to = index.min(order.len());
    order.insert(to, slot);
    apply_order(scene, &order);
    Ok(())
}

/// Flips visibility; returns the new value.
pub fn toggle_visibility(scene: &mut Scene, id: LayerId) -> Result<bool, OrderingError> {
    refuse_background(id, "hidden")?;
    let layer = layer_mut(scene, id)?;
    layer.visible = !layer.visible;
    Ok(layer.visible)
}

/// Flips the lock; returns the new value.
pub fn toggle_lock(scene: &mut Scene, id: LayerId) -> Result<bool, OrderingError> {
    refuse_background(id, "locked")?;
    let layer = layer_mut(scene, id)?;
    layer.locked = !layer.locked;
    Ok(layer.locked)
}

/// Sets the display label. The machine `name` is left alone.
pub fn rename(scene: &mut Scene, id: LayerId, label: impl Into<String>) -> Result<(), OrderingError> {
    refuse_background(id, "renamed")?;
    layer_mut(scene, id)?.label = label.into();
    Ok(())
}

pub fn delete(scene: &mut Scene, id: LayerId) -> Result<Layer, OrderingError> {
    refuse_background(id, "deleted")?;
    let index = scene.index_of(id).ok_or(OrderingError::NotFound(id))?;
    let removed = scene.layers.remove(index);
    renumber(scene);
    Ok(removed)
}

/// Appends `layer` on top of the stack, assigning an id when it has none.
pub fn add(scene: &mut Scene, mut layer: Layer) -> LayerId {
    if layer.id == LayerId::UNASSIGNED
        || layer.id.is_background()
        || scene.layer(layer.id).is_some()
    {
        layer.id = scene.next_id();
    }
    let id = layer.id;
    let mut order = slots(scene);
    scene.layers.push(layer);
    order.push(id);
    apply_order(scene, &order);
    id
}

/// Copies each layer in `ids`, nudged by [`DUPLICATE_OFFSET`], and places
/// the copies on top of the stack in the given order.
///
/// The copy of `ids[i]` gets id `max + 1 + i`, so a multi-duplicate never
/// collides. Nothing is changed if any id is invalid.
pub fn duplicate(scene: &mut Scene, ids: &[LayerId]) -> Result<Vec<LayerId>, OrderingError> {
    for &id in ids {
        refuse_background(id, "duplicated")?;
        if scene.layer(id).is_none() {
            return Err(OrderingError::NotFound(id));
        }
    }

    let (dx, dy) = match scene.normalizer(scene.reference_width) {
        Ok(n) => n.reference_delta_percent(DUPLICATE_OFFSET, DUPLICATE_OFFSET),
        Err(err) => {
            tracing::warn!("Cannot compute duplicate offset: {}", err);
            (0.0, 0.0)
        }
    };

    let base = scene.next_id().0;
    let mut order = slots(scene);
    let mut created = Vec::with_capacity(ids.len());
    for (i, &id) in ids.iter().enumerate() {
        let Some(source) = scene.layer(id) else {
            continue;
        };
        let mut copy = source.clone();
        copy.id = LayerId(base + i as i64);
        copy.position = copy.position.offset(dx, dy);
        if !copy.label.is_empty() {
            copy.label = format!("{} copy", copy.label);
        }
        order.push(copy.id);
        created.push(copy.id);
        scene.layers.push(copy);
    }
    apply_order(scene, &order);
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::ShapeGeometry;
    use crate::scene::Background;

    fn scene() -> Scene {
        Scene::new(Background::new("bg.png", 1000, 500)).with_layers(vec![
            Layer::shape(LayerId(1), ShapeGeometry::Rectangle).with_z(1),
            Layer::shape(LayerId(2), ShapeGeometry::Circle).with_z(1),
            Layer::text(LayerId(3), "hi").with_z(5),
        ])
    }

    fn order(scene: &Scene) -> Vec<i64> {
        scene.paint_order().iter().map(|i| i.id().0).collect()
    }

    fn zs(scene: &Scene) -> Vec<i32> {
        scene.paint_order().iter().map(|i| i.z_index()).collect()
    }

    #[test]
    fn renumber_is_dense_and_stable() {
        let mut s = scene();
        renumber(&mut s);
        assert_eq!(order(&s), vec![-1, 1, 2, 3]);
        assert_eq!(zs(&s), vec![0, 1, 2, 3]);
    }

    #[test]
    fn move_up_and_down_swap_neighbours() {
        let mut s = scene();
        move_up(&mut s, LayerId(1)).unwrap();
        assert_eq!(order(&s), vec![-1, 2, 1, 3]);
        move_down(&mut s, LayerId(2)).unwrap();
        assert_eq!(order(&s), vec![2, -1, 1, 3]);
        move_up(&mut s, LayerId(3)).unwrap();
        assert_eq!(order(&s), vec![2, -1, 1, 3]);
        assert_eq!(zs(&s), vec![0, 1, 2, 3]);
    }

    #[test]
    fn reorder_splices() {
        let mut s = scene();
        reorder(&mut s, LayerId(3), 0).unwrap();
        assert_eq!(order(&s), vec![3, -1, 1, 2]);
        reorder(&mut s, LayerId(3), 99).unwrap();
        assert_eq!(order(&s), vec![-1, 1, 2, 3]);
    }

    #[test]
    fn background_is_protected() {
        let mut s = scene();
        assert_eq!(
            delete(&mut s, LayerId::BACKGROUND),
            Err(OrderingError::BackgroundProtected("deleted"))
        );
        assert!(duplicate(&mut s, &[LayerId::BACKGROUND]).is_err());
        assert!(toggle_lock(&mut s, LayerId::BACKGROUND).is_err());
        assert_eq!(s.layers.len(), 3);
    }

    #[test]
    fn rename_leaves_machine_name() {
        let mut s = scene();
        s.layers[2].name = "recipient".into();
        rename(&mut s, LayerId(3), "Recipient name").unwrap();
        assert_eq!(s.layers[2].name, "recipient");
        assert_eq!(s.layers[2].label, "Recipient name");
    }

    #[test]
    fn locked_layers_can_still_be_reordered_and_hidden() {
        let mut s = scene();
        assert!(toggle_lock(&mut s, LayerId(1)).unwrap());
        move_up(&mut s, LayerId(1)).unwrap();
        assert!(!toggle_visibility(&mut s, LayerId(1)).unwrap());
    }

    #[test]
    fn duplicate_assigns_fresh_ids_and_goes_on_top() {
        let mut s = scene();
        let created = duplicate(&mut s, &[LayerId(1), LayerId(2)]).unwrap();
        assert_eq!(created, vec![LayerId(4), LayerId(5)]);
        assert_eq!(order(&s), vec![-1, 1, 2, 3, 4, 5]);

        let copy = s.layer(LayerId(4)).unwrap();
        // 20 reference units on a 1000x500 template: 2% across, 4% down.
        assert!((copy.position.x - 52.0).abs() < 1e-4);
        assert!((copy.position.y - 54.0).abs() < 1e-4);
    }

    #[test]
    fn duplicate_rejects_unknown_ids_without_changes() {
        let mut s = scene();
        assert_eq!(
            duplicate(&mut s, &[LayerId(1), LayerId(42)]),
            Err(OrderingError::NotFound(LayerId(42)))
        );
        assert_eq!(s.layers.len(), 3);
    }

    #[test]
    fn delete_renumbers() {
        let mut s = scene();
        delete(&mut s, LayerId(2)).unwrap();
        assert_eq!(order(&s), vec![-1, 1, 3]);
        assert_eq!(zs(&s), vec![0, 1, 2]);
    }

    #[test]
    fn add_places_new_layer_on_top() {
        let mut s = scene();
        let id = add(&mut s, Layer::text(LayerId::UNASSIGNED, "new"));
        assert_eq!(id, LayerId(4));
        assert_eq!(order(&s).last(), Some(&4));
    }
}
