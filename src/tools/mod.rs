pub mod extract;
pub mod ingredient_kb;
pub mod openfoodfacts;

pub use ingredient_kb::IngredientKb;
pub use openfoodfacts::OpenFoodFactsClient;
