// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! The fixed product catalog.

use serde::Serialize;

/// A redeemable product.
///
/// `stock` is the nominal quantity shown to users; it is not decremented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Price in points.
    pub price: u64,
    pub image: &'static str,
    pub stock: u32,
}

static PRODUCTS: [Product; 4] = [
    Product {
        id: "prod1",
        name: "Sirius Premium Mug",
        description: "Premium ceramic mug with the official Sirius logo. 350ml, microwave and dishwasher safe",
        price: 500,
        image: "/producto1.png",
        stock: 10,
    },
    Product {
        id: "prod2",
        name: "Sirius Tote Bag",
        description: "100% organic cotton bag with an exclusive Sirius design. 38x42cm, reinforced handles",
        price: 1000,
        image: "/producto2.png",
        stock: 25,
    },
    Product {
        id: "prod3",
        name: "Sirius A5 Notebook",
        description: "Premium A5 spiral notebook, 120 pages of high quality paper, hard cover with Sirius logo",
        price: 300,
        image: "/producto3.png",
        stock: 50,
    },
    Product {
        id: "prod4",
        name: "Sirius Limited Hoodie",
        description: "Limited edition hoodie, 100% premium cotton, embroidered Sirius logo",
        price: 2000,
        image: "/producto4.png",
        stock: 5,
    },
];

/// Read-only view of the catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct Catalog;

impl Catalog {
    pub fn products(&self) -> &'static [Product] {
        &PRODUCTS
    }

    pub fn get(&self, id: &str) -> Option<&'static Product> {
        PRODUCTS.iter().find(|product| product.id == id)
    }
}
