//! Fixed demonstration set loaded by [`crate::MenuPipeline::view_examples`].
//!
//! Order matters: slot *i* always shows entry *i*.

use crate::menu::DishRecord;

/// `(name, description, image)` triples in slot order.
pub const EXAMPLE_DISHES: [(&str, &str, &str); 5] = [
    (
        "Margherita Pizza",
        "Wood-fired crust topped with San Marzano tomatoes, fresh mozzarella and basil",
        "assets/examples/margherita-pizza.jpg",
    ),
    (
        "Beef Pho",
        "Slow-simmered star anise broth with rice noodles, rare beef and fresh herbs",
        "assets/examples/beef-pho.jpg",
    ),
    (
        "Caesar Salad",
        "Crisp romaine, shaved parmesan and garlic croutons in a creamy anchovy dressing",
        "assets/examples/caesar-salad.jpg",
    ),
    (
        "Pad Thai",
        "Stir-fried rice noodles with shrimp, tamarind, peanuts and a squeeze of lime",
        "assets/examples/pad-thai.jpg",
    ),
    (
        "Tiramisu",
        "Classic Italian dessert with coffee-soaked ladyfingers and mascarpone cream",
        "assets/examples/tiramisu.jpg",
    ),
];

/// The demonstration set as dish records paired with their image location.
pub fn example_entries() -> Vec<(DishRecord, String)> {
    EXAMPLE_DISHES
        .iter()
        .map(|(name, description, image)| (DishRecord::new(*name, *description), image.to_string()))
        .collect()
}
