mod test_disconnect_announces_leave;
mod test_join_and_route_offer;
mod test_rejects_unknown_token;
