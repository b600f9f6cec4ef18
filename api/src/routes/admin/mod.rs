pub mod index_reset_route;
